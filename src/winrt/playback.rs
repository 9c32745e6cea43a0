//! `AudioPlaybackConnection` backed connections

use crate::connection::status::{ConnectionState, OpenOutcome};
use crate::connection::traits::{AudioConnector, PlaybackConnection, StateObserver, Subscription};
use crate::error::Result;
use crate::winrt::ensure_apartment;
use log::{debug, warn};
use std::sync::Arc;
use windows::core::{IInspectable, HSTRING};
use windows::Foundation::Metadata::ApiInformation;
use windows::Foundation::TypedEventHandler;
use windows::Media::Audio::{
    AudioPlaybackConnection, AudioPlaybackConnectionOpenResultStatus,
    AudioPlaybackConnectionState,
};

const CONNECTION_TYPE: &str = "Windows.Media.Audio.AudioPlaybackConnection";

/// Whether this Windows build has `AudioPlaybackConnection` (2004 and later)
pub fn is_supported() -> bool {
    ApiInformation::IsTypePresent(&HSTRING::from(CONNECTION_TYPE)).unwrap_or(false)
}

/// Device selector string used to filter the picker
pub fn device_selector() -> Result<HSTRING> {
    Ok(AudioPlaybackConnection::GetDeviceSelector()?)
}

pub struct WinRtConnector;

impl AudioConnector for WinRtConnector {
    fn try_create_from_id(&self, device_id: &str) -> Result<Option<Arc<dyn PlaybackConnection>>> {
        ensure_apartment();
        match AudioPlaybackConnection::TryCreateFromId(&HSTRING::from(device_id)) {
            Ok(inner) => Ok(Some(Arc::new(WinRtConnection { inner }))),
            // A null result surfaces as an error carrying a success code
            Err(e) if e.code().is_ok() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct WinRtConnection {
    inner: AudioPlaybackConnection,
}

impl PlaybackConnection for WinRtConnection {
    fn start(&self) -> Result<()> {
        ensure_apartment();
        self.inner.StartAsync()?.get()?;
        Ok(())
    }

    fn open(&self) -> Result<OpenOutcome> {
        ensure_apartment();
        let result = self.inner.OpenAsync()?.get()?;
        let status = result.Status()?;

        let outcome = if status == AudioPlaybackConnectionOpenResultStatus::Success {
            OpenOutcome::Success
        } else if status == AudioPlaybackConnectionOpenResultStatus::RequestTimedOut {
            OpenOutcome::RequestTimedOut
        } else if status == AudioPlaybackConnectionOpenResultStatus::DeniedBySystem {
            OpenOutcome::DeniedBySystem
        } else {
            OpenOutcome::UnknownFailure {
                extended_error: result.ExtendedError()?.0 as u32,
            }
        };
        debug!("Open result: {:?}", outcome);
        Ok(outcome)
    }

    fn on_state_changed(&self, observer: StateObserver) -> Result<Subscription> {
        let handler = TypedEventHandler::<AudioPlaybackConnection, IInspectable>::new(
            move |sender, _| {
                if let Some(connection) = sender {
                    let state = connection.State()?;
                    if state == AudioPlaybackConnectionState::Closed {
                        observer(ConnectionState::Closed);
                    } else if state == AudioPlaybackConnectionState::Opened {
                        observer(ConnectionState::Opened);
                    }
                }
                Ok(())
            },
        );

        let token = self.inner.StateChanged(&handler)?;
        let inner = self.inner.clone();
        Ok(Subscription::new(move || {
            if let Err(e) = inner.RemoveStateChanged(token) {
                debug!("Failed to remove state handler: {}", e);
            }
        }))
    }

    fn close(&self) {
        if let Err(e) = self.inner.Close() {
            warn!("Failed to close audio playback connection: {}", e);
        }
    }
}
