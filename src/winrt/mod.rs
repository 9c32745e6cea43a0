//! WinRT implementations of the connection capabilities
//!
//! `AudioPlaybackConnection` for the audio redirection itself, `DevicePicker`
//! for discovery and per-device status, and `DeviceInformation` for resolving
//! persisted ids.

pub mod picker;
pub mod playback;
pub mod resolver;

pub use picker::{DeviceCache, PickerHost};
pub use playback::{is_supported, WinRtConnector};
pub use resolver::WinRtResolver;

use std::cell::OnceCell;
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

/// Balances a successful `CoInitializeEx` when its thread exits
struct ApartmentGuard;

impl Drop for ApartmentGuard {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
    }
}

thread_local! {
    /// `None` once the join was attempted and refused
    static APARTMENT: OnceCell<Option<ApartmentGuard>> = const { OnceCell::new() };
}

/// Join the MTA on worker threads before their first WinRT call.
///
/// Threads that already joined an STA keep it (the call fails with
/// RPC_E_CHANGED_MODE and nothing is undone at exit).
pub(crate) fn ensure_apartment() {
    APARTMENT.with(|apartment| {
        apartment.get_or_init(|| {
            let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
            hr.is_ok().then(|| ApartmentGuard)
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn has_joined() -> bool {
        APARTMENT.with(|apartment| matches!(apartment.get(), Some(Some(_))))
    }

    #[test]
    fn test_worker_thread_joins_once() {
        let joined = thread::spawn(|| {
            assert!(!has_joined());
            ensure_apartment();
            ensure_apartment();
            has_joined()
        })
        .join()
        .unwrap();
        assert!(joined);
    }

    #[test]
    fn test_sta_thread_is_left_alone() {
        let joined = thread::spawn(|| {
            use windows::Win32::System::Com::COINIT_APARTMENTTHREADED;
            unsafe {
                CoInitializeEx(None, COINIT_APARTMENTTHREADED).ok().unwrap();
            }
            ensure_apartment();
            let joined = has_joined();
            unsafe { CoUninitialize() };
            joined
        })
        .join()
        .unwrap();
        assert!(!joined);
    }
}
