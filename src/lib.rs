pub mod config;
pub mod container_manager;
pub mod control_api;
pub mod database;
pub mod error;
pub mod event_bus;
pub mod gateway;
pub mod hostinfo;
pub mod provisioner;
pub mod sandbox;
pub mod secretbox;
pub mod supervisor;
pub mod telemetry;
pub mod worker_agent;

pub use error::{ErrorKind, FleetError};
