use crate::connection::device::DeviceDescriptor;
use crate::connection::traits::DeviceResolver;
use crate::error::{AppError, Result};
use crate::winrt::{ensure_apartment, DeviceCache};
use std::sync::Arc;
use windows::core::HSTRING;
use windows::Devices::Enumeration::DeviceInformation;

/// Resolves ids through `DeviceInformation::CreateFromIdAsync`
pub struct WinRtResolver {
    cache: Arc<DeviceCache>,
}

impl WinRtResolver {
    pub fn new(cache: Arc<DeviceCache>) -> Self {
        Self { cache }
    }
}

impl DeviceResolver for WinRtResolver {
    fn resolve(&self, device_id: &str) -> Result<DeviceDescriptor> {
        ensure_apartment();
        let info = DeviceInformation::CreateFromIdAsync(&HSTRING::from(device_id))
            .and_then(|op| op.get())
            .map_err(|e| AppError::DeviceResolution(format!("{}: {}", device_id, e.message())))?;
        self.cache.remember(&info)
    }
}
