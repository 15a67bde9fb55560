// CLI module for nowplaying
//
// Only compiled into the binary; the library and the Python extension do
// not depend on it.

pub mod commands;
pub mod config;
pub mod interactive;

pub use config::{Command, Config};
