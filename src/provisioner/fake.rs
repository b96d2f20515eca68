//! In-memory `CloudProvider` fake for integration tests, grounded in the
//! teacher's mock-collaborator test style (a fake standing in for a slow
//! external dependency, advancing state on a configurable delay rather than
//! a real clock tick).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::provider::{CloudProvider, InstanceDescription, InstanceState, LaunchSpec};

struct FakeInstance {
    instance_type: String,
    requested_at: Instant,
    terminated: bool,
}

/// Simulates provisioning/boot delay: an instance reports `Pending` until
/// `boot_delay` has elapsed since launch, then `Running`.
pub struct InMemoryProvider {
    boot_delay: Duration,
    instances: Mutex<HashMap<String, FakeInstance>>,
}

impl InMemoryProvider {
    pub fn new(boot_delay: Duration) -> Self {
        Self {
            boot_delay,
            instances: Mutex::new(HashMap::new()),
        }
    }

    fn observed_state(instance: &FakeInstance, boot_delay: Duration) -> InstanceState {
        if instance.terminated {
            InstanceState::Terminated
        } else if instance.requested_at.elapsed() >= boot_delay {
            InstanceState::Running
        } else {
            InstanceState::Pending
        }
    }
}

#[async_trait]
impl CloudProvider for InMemoryProvider {
    async fn launch(&self, spec: &LaunchSpec) -> Result<String, String> {
        let id = format!("i-{}", Uuid::new_v4().simple());
        self.instances.lock().await.insert(
            id.clone(),
            FakeInstance {
                instance_type: spec.instance_type.clone(),
                requested_at: Instant::now(),
                terminated: false,
            },
        );
        Ok(id)
    }

    async fn wait_state(&self, instance_id: &str, desired: InstanceState, timeout: Duration) -> Result<(), String> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = {
                let instances = self.instances.lock().await;
                let instance = instances.get(instance_id).ok_or_else(|| "unknown instance".to_owned())?;
                Self::observed_state(instance, self.boot_delay)
            };
            if state == desired {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(format!("timed out waiting for {instance_id} to reach {desired:?}"));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn describe(&self, instance_id: &str) -> Result<InstanceDescription, String> {
        let instances = self.instances.lock().await;
        let instance = instances.get(instance_id).ok_or_else(|| "unknown instance".to_owned())?;
        let state = Self::observed_state(instance, self.boot_delay);
        let private_ip = matches!(state, InstanceState::Running).then(|| "10.0.0.10".to_owned());
        Ok(InstanceDescription {
            state,
            instance_type: instance.instance_type.clone(),
            private_ip,
            public_ip: None,
        })
    }

    async fn modify_type(&self, instance_id: &str, new_type: &str) -> Result<(), String> {
        let mut instances = self.instances.lock().await;
        let instance = instances.get_mut(instance_id).ok_or_else(|| "unknown instance".to_owned())?;
        instance.instance_type = new_type.to_owned();
        instance.requested_at = Instant::now();
        Ok(())
    }

    async fn terminate(&self, instance_id: &str) -> Result<(), String> {
        let mut instances = self.instances.lock().await;
        let instance = instances.get_mut(instance_id).ok_or_else(|| "unknown instance".to_owned())?;
        instance.terminated = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            project: "demo".to_owned(),
            instance_type: "m5.large".to_owned(),
            disk_gb: 50,
            region: "us-east-1".to_owned(),
            user_data: String::new(),
        }
    }

    #[tokio::test]
    async fn launches_pending_then_running_after_boot_delay() {
        let provider = InMemoryProvider::new(Duration::from_millis(20));
        let id = provider.launch(&spec()).await.unwrap();
        let desc = provider.describe(&id).await.unwrap();
        assert_eq!(desc.state, InstanceState::Pending);

        provider.wait_state(&id, InstanceState::Running, Duration::from_secs(1)).await.unwrap();
        let desc = provider.describe(&id).await.unwrap();
        assert_eq!(desc.state, InstanceState::Running);
        assert!(desc.private_ip.is_some());
    }

    #[tokio::test]
    async fn wait_state_times_out_for_unreachable_target() {
        let provider = InMemoryProvider::new(Duration::from_secs(999));
        let id = provider.launch(&spec()).await.unwrap();
        let err = provider
            .wait_state(&id, InstanceState::Running, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.contains("timed out"));
    }

    #[tokio::test]
    async fn modify_type_changes_reported_type() {
        let provider = InMemoryProvider::new(Duration::from_millis(10));
        let id = provider.launch(&spec()).await.unwrap();
        provider.modify_type(&id, "m5.xlarge").await.unwrap();
        let desc = provider.describe(&id).await.unwrap();
        assert_eq!(desc.instance_type, "m5.xlarge");
    }

    #[tokio::test]
    async fn terminate_marks_instance_terminated() {
        let provider = InMemoryProvider::new(Duration::from_millis(10));
        let id = provider.launch(&spec()).await.unwrap();
        provider.terminate(&id).await.unwrap();
        let desc = provider.describe(&id).await.unwrap();
        assert_eq!(desc.state, InstanceState::Terminated);
    }
}
