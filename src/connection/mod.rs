pub mod controller;
pub mod device;
pub mod registry;
pub mod status;
pub mod traits;

pub use controller::{ConnectionController, ControllerEvent};
pub use device::DeviceDescriptor;
pub use registry::{ConnectionEntry, ConnectionHandle, Registry};
pub use status::{
    ConnectFailure, ConnectionState, ConnectionStatus, DisplayStatusOptions, OpenOutcome,
};
pub use traits::{AudioConnector, DeviceResolver, PlaybackConnection, StatusDisplay, Subscription};
