//! Client for the CharaChorder serial command protocol.
//!
//! The recommended API surface is:
//! - [`DeviceSession`] for the handshake and typed queries
//! - [`Chord`] with [`decode_actions`] / [`decode_phrase`] for chord payloads
//! - [`CapabilityTable`] for the model and firmware tables behind capabilities
//! - [`transport`] for serial and scripted I/O adapters
//!
//! [`protocol`] and [`framing`] expose the wire-level helpers for advanced use.

mod capability;
mod chord;
mod client;
/// CRLF line framing.
pub mod framing;
/// Request encoding and reply validation.
pub mod protocol;
#[cfg(feature = "python")]
mod python;
/// Transport adapters for connecting to a device.
pub mod transport;

pub use capability::{
    Capabilities, CapabilityGate, CapabilityTable, DeviceDetails, DeviceIdentity, DeviceModel,
    SessionState, version_gte,
};
pub use chord::{Chord, decode_actions, decode_phrase};
/// Errors returned by the typed session operations.
pub use client::{CommandError, InitError};
pub use client::{DeviceInfo, DeviceSession, DiagnosticsReport, Setting, SettingId};
pub use transport::DEFAULT_TIMEOUT;
