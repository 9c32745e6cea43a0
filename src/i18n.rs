//! Internationalization support using rust-i18n
//!
//! Provides locale detection and initialization of the i18n system.

use log::info;

/// Locales with a catalog under `locales/`
pub const SUPPORTED_LOCALES: &[&str] = &["en", "zh-CN"];

/// Detect the user's OS locale using Windows API
///
/// Returns the locale string (e.g., "en-US", "zh-CN") or falls back to "en" on failure.
#[cfg(windows)]
pub fn detect_locale() -> String {
    use log::warn;
    use windows::Win32::Globalization::GetUserDefaultLocaleName;

    unsafe {
        let mut buffer = [0u16; 85]; // LOCALE_NAME_MAX_LENGTH
        let len = GetUserDefaultLocaleName(&mut buffer);

        if len > 0 && len <= buffer.len() as i32 {
            // Drop the null terminator
            match String::from_utf16(&buffer[..len as usize - 1]) {
                Ok(locale) => {
                    info!("Detected system locale: {}", locale);
                    locale
                }
                Err(e) => {
                    warn!("Failed to convert locale to UTF-8: {}, falling back to 'en'", e);
                    "en".to_string()
                }
            }
        } else {
            warn!("GetUserDefaultLocaleName failed, falling back to 'en'");
            "en".to_string()
        }
    }
}

/// Detect the user's locale from the POSIX environment
#[cfg(not(windows))]
pub fn detect_locale() -> String {
    let raw = ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.is_empty())
        .unwrap_or_default();

    // "zh_CN.UTF-8" -> "zh-CN"
    let locale = raw
        .split('.')
        .next()
        .unwrap_or_default()
        .replace('_', "-");

    if locale.is_empty() || locale == "C" || locale == "POSIX" {
        "en".to_string()
    } else {
        locale
    }
}

/// Map a detected locale onto the closest catalog we ship
pub fn resolve_locale(locale: &str) -> &'static str {
    if let Some(exact) = SUPPORTED_LOCALES
        .iter()
        .find(|supported| supported.eq_ignore_ascii_case(locale))
    {
        return exact;
    }
    let language = locale.split('-').next().unwrap_or_default();
    SUPPORTED_LOCALES
        .iter()
        .find(|supported| {
            supported
                .split('-')
                .next()
                .map_or(false, |l| l.eq_ignore_ascii_case(language))
        })
        .copied()
        .unwrap_or("en")
}

/// Initialize the i18n system with optional language override
///
/// If `config_language` is Some, uses that locale. Otherwise, detects the system locale.
pub fn init(config_language: Option<&str>) {
    let requested = match config_language {
        Some(lang) => {
            info!("Using configured language: {}", lang);
            lang.to_string()
        }
        None => detect_locale(),
    };

    let locale = resolve_locale(&requested);
    rust_i18n::set_locale(locale);
    info!("Locale set to: {}", locale);
}
