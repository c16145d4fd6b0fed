pub mod activation;
pub mod archive;
pub mod commands;
pub mod config;
pub mod download;
pub mod error;
pub mod host;
pub mod http;
pub mod manager;
pub mod package;
pub mod runtime;
pub mod staging;

pub use error::{ModError, ModResult};
pub use manager::{ModManager, UninstallOptions};
