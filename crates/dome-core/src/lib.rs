//! dome-core: wire format and configuration shared by the Dome receiver,
//! the daemon, and the sender tool.

pub mod config;
pub mod wire;

pub use config::{ConfigError, DomeConfig};
pub use wire::{is_newer, Packet, WireError};
