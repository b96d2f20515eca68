//! Local-vs-remote routing decision, generalized from the teacher's
//! `SandboxManager::should_sandbox` boolean gate into a Store-state-driven
//! choice between driving the sandbox in-process or through WorkerAgent.

use crate::database::models::worker::{Worker, WorkerStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Local,
    Remote { instance_id: String },
}

/// A project routes to its worker only once that worker is fully `ready`;
/// any other worker status (including absent) means ContainerManager drives
/// the sandbox locally.
pub fn decide_mode(worker: Option<&Worker>) -> Mode {
    match worker {
        Some(w) if WorkerStatus::from(w.status.clone()) == WorkerStatus::Ready => Mode::Remote {
            instance_id: w.instance_id.clone(),
        },
        _ => Mode::Local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker_with_status(status: &str) -> Worker {
        Worker {
            instance_id: "i-1".into(),
            project_name: "demo".into(),
            instance_type: "m5.large".into(),
            region: "us-east-1".into(),
            availability_zone: "us-east-1a".into(),
            private_ip: None,
            public_ip: None,
            status: status.to_owned(),
            worker_token_ciphertext: "ct".into(),
            created_at: "now".into(),
            last_heartbeat: None,
        }
    }

    #[test]
    fn no_worker_routes_local() {
        assert_eq!(decide_mode(None), Mode::Local);
    }

    #[test]
    fn ready_worker_routes_remote() {
        let w = worker_with_status("ready");
        assert_eq!(decide_mode(Some(&w)), Mode::Remote { instance_id: "i-1".into() });
    }

    #[test]
    fn provisioning_worker_still_routes_local() {
        let w = worker_with_status("provisioning");
        assert_eq!(decide_mode(Some(&w)), Mode::Local);
    }
}
