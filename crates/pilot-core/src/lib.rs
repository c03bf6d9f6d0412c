//! Core of the Pilot server launcher.
//!
//! - [`log`]: framing, parsing and status sniffing of server output
//! - [`supervisor`]: server process lifecycle
//! - [`store`]: the device-set configuration directory
//! - [`device_set`]: the few device-set attributes the launcher reads
//! - [`config`]: launcher settings and directories

pub mod config;
pub mod device_set;
pub mod log;
pub mod store;
pub mod supervisor;

mod error;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};
pub use store::{ConfigStore, WritePermissions};
pub use supervisor::{
    ExitedServer, InstanceState, OutputData, OutputStream, ProcessOutput, ProcessPolicy,
    ServerInstance, StopOutcome, Supervisor,
};

pub use pilot_types::*;
