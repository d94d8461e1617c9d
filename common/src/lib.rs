pub mod codes;
pub mod config;
pub mod controller;
pub mod device;
pub mod encoding;
pub mod routes;
pub mod transmit;

pub use codes::{code_for, RfCode};
pub use config::{NetworkConfig, RfConfig, RuntimeConfig};
pub use controller::{ControllerSnapshot, DeviceStateController, DeviceStatus};
pub use device::{Device, DeviceState, UnknownDevice};
pub use encoding::{encode_frame, Pulse, RfFrame, RfProtocol};
pub use routes::*;
pub use transmit::{
    monotonic_ms, BurstTransmitter, FrameSink, RfTransmit, TransmitError, TransmitterDiagnostics,
};
