//! Session broker: starts browser-automation backends on demand.
//!
//! A requested service name and version resolve to either a container image
//! or a driver command. The broker starts the backend, reports its endpoint,
//! waits until the endpoint answers, and hands back a handle that tears the
//! backend down again.

pub mod cli;
pub mod config;
pub mod error;
pub mod service;
pub mod session;
pub mod testing;

pub use config::BrokerConfig;
pub use error::{ConfigError, SessionError, StartError, WaitError};
pub use session::SessionBroker;
