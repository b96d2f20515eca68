//! `CloudProvider`: the external collaborator abstraction for instance
//! lifecycle, kept trait-object-friendly so the reference in-memory fake and
//! a real cloud adapter are interchangeable.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub project: String,
    pub instance_type: String,
    pub disk_gb: u32,
    pub region: String,
    pub user_data: String,
}

#[derive(Debug, Clone)]
pub struct InstanceDescription {
    pub state: InstanceState,
    pub instance_type: String,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
}

#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<String, String>;
    async fn wait_state(&self, instance_id: &str, desired: InstanceState, timeout: Duration) -> Result<(), String>;
    async fn describe(&self, instance_id: &str) -> Result<InstanceDescription, String>;
    async fn modify_type(&self, instance_id: &str, new_type: &str) -> Result<(), String>;
    async fn terminate(&self, instance_id: &str) -> Result<(), String>;
}
