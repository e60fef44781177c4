/*!
 * Blueman Mechanism
 * Privileged helper for rfkill and Bluetooth power control
 */

pub mod authority;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod rfkill;
pub mod server;

pub use authority::{Authority, Caller};
pub use client::MechanismClient;
pub use config::MechanismConfig;
pub use error::MechanismError;
pub use protocol::{ErrorKind, Request, Response};
