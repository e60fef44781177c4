/*!
 * Blueman Applet
 * Bluetooth tray applet with a dependency-ordered plugin core
 */

pub mod applet;
pub mod bluetooth;
pub mod client;
pub mod config;
pub mod error;
pub mod ipc;
pub mod menu;
pub mod plugin;
pub mod plugins;
pub mod runtime;

pub use applet::Applet;
pub use config::AppletConfig;
pub use error::PluginError;
