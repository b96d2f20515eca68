use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::database::schema::workers;

/// Worker database row (Queryable). `worker_token_ciphertext` is SecretBox-encrypted
/// (not hashed), since ContainerManager must decrypt it again to authenticate its
/// outbound requests to WorkerAgent.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = workers)]
pub struct Worker {
    pub instance_id: String,
    pub project_name: String,
    pub instance_type: String,
    pub region: String,
    pub availability_zone: String,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub status: String,
    pub worker_token_ciphertext: String,
    pub created_at: String,
    pub last_heartbeat: Option<String>,
}

/// Worker status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Provisioning,
    Bootstrapping,
    Ready,
    Stopping,
    Terminated,
    Error,
}

impl From<String> for WorkerStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "provisioning" => WorkerStatus::Provisioning,
            "bootstrapping" => WorkerStatus::Bootstrapping,
            "ready" => WorkerStatus::Ready,
            "stopping" => WorkerStatus::Stopping,
            "terminated" => WorkerStatus::Terminated,
            "error" => WorkerStatus::Error,
            _ => WorkerStatus::Error,
        }
    }
}

impl From<WorkerStatus> for String {
    fn from(status: WorkerStatus) -> Self {
        match status {
            WorkerStatus::Provisioning => "provisioning",
            WorkerStatus::Bootstrapping => "bootstrapping",
            WorkerStatus::Ready => "ready",
            WorkerStatus::Stopping => "stopping",
            WorkerStatus::Terminated => "terminated",
            WorkerStatus::Error => "error",
        }
        .to_owned()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerData {
    pub instance_id: String,
    pub project_name: String,
    pub instance_type: String,
    pub region: String,
    pub availability_zone: String,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub status: WorkerStatus,
    pub created_at: String,
    pub last_heartbeat: Option<String>,
}

impl From<Worker> for WorkerData {
    fn from(row: Worker) -> Self {
        Self {
            instance_id: row.instance_id,
            project_name: row.project_name,
            instance_type: row.instance_type,
            region: row.region,
            availability_zone: row.availability_zone,
            private_ip: row.private_ip,
            public_ip: row.public_ip,
            status: WorkerStatus::from(row.status),
            created_at: row.created_at,
            last_heartbeat: row.last_heartbeat,
        }
    }
}

/// New worker for insertion (Insertable). `worker_token_ciphertext` is computed by
/// the caller (WorkerProvisioner) before persisting.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = workers)]
pub struct NewWorker {
    pub instance_id: String,
    pub project_name: String,
    pub instance_type: String,
    pub region: String,
    pub availability_zone: String,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub status: String,
    pub worker_token_ciphertext: String,
    pub created_at: String,
    pub last_heartbeat: Option<String>,
}

impl NewWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance_id: impl Into<String>,
        project_name: impl Into<String>,
        instance_type: impl Into<String>,
        region: impl Into<String>,
        availability_zone: impl Into<String>,
        worker_token_ciphertext: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            project_name: project_name.into(),
            instance_type: instance_type.into(),
            region: region.into(),
            availability_zone: availability_zone.into(),
            private_ip: None,
            public_ip: None,
            status: String::from(WorkerStatus::Provisioning),
            worker_token_ciphertext: worker_token_ciphertext.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
            last_heartbeat: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            WorkerStatus::Provisioning,
            WorkerStatus::Bootstrapping,
            WorkerStatus::Ready,
            WorkerStatus::Stopping,
            WorkerStatus::Terminated,
            WorkerStatus::Error,
        ] {
            let s = String::from(status);
            assert_eq!(WorkerStatus::from(s.clone()), status, "{s}");
        }
    }

    #[test]
    fn new_worker_defaults_to_provisioning() {
        let w = NewWorker::new("i-1", "proj", "m5.large", "us-east-1", "us-east-1a", "ciphertext");
        assert_eq!(w.status, "provisioning");
        assert!(w.last_heartbeat.is_none());
    }
}
