use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::database::schema::projects;

/// Project database row (Queryable)
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = projects)]
pub struct Project {
    pub name: String,
    pub status: String,
    pub llm_credential_ciphertext: String,
    pub extra_env_ciphertext: String,
    pub mcp_servers_json: String,
    pub instance_type: Option<String>,
    pub worker_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Project status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Creating,
    Provisioning,
    Bootstrapping,
    Running,
    Stopped,
    Resizing,
    Error,
    Terminated,
}

impl From<String> for ProjectStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "creating" => ProjectStatus::Creating,
            "provisioning" => ProjectStatus::Provisioning,
            "bootstrapping" => ProjectStatus::Bootstrapping,
            "running" => ProjectStatus::Running,
            "stopped" => ProjectStatus::Stopped,
            "resizing" => ProjectStatus::Resizing,
            "error" => ProjectStatus::Error,
            "terminated" => ProjectStatus::Terminated,
            _ => ProjectStatus::Error,
        }
    }
}

impl From<ProjectStatus> for String {
    fn from(status: ProjectStatus) -> Self {
        match status {
            ProjectStatus::Creating => "creating",
            ProjectStatus::Provisioning => "provisioning",
            ProjectStatus::Bootstrapping => "bootstrapping",
            ProjectStatus::Running => "running",
            ProjectStatus::Stopped => "stopped",
            ProjectStatus::Resizing => "resizing",
            ProjectStatus::Error => "error",
            ProjectStatus::Terminated => "terminated",
        }
        .to_owned()
    }
}

/// Typed Project with status enum and decoded mcp server list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectData {
    pub name: String,
    pub status: ProjectStatus,
    pub mcp_servers: Vec<String>,
    pub instance_type: Option<String>,
    pub worker_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Project> for ProjectData {
    fn from(row: Project) -> Self {
        Self {
            name: row.name,
            status: ProjectStatus::from(row.status),
            mcp_servers: serde_json::from_str(&row.mcp_servers_json).unwrap_or_default(),
            instance_type: row.instance_type,
            worker_id: row.worker_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// New project for insertion (Insertable)
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = projects)]
pub struct NewProject {
    pub name: String,
    pub status: String,
    pub llm_credential_ciphertext: String,
    pub extra_env_ciphertext: String,
    pub mcp_servers_json: String,
    pub instance_type: Option<String>,
    pub worker_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl NewProject {
    pub fn new(
        name: impl Into<String>,
        llm_credential_ciphertext: impl Into<String>,
        extra_env_ciphertext: impl Into<String>,
        mcp_servers: &[String],
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            name: name.into(),
            status: String::from(ProjectStatus::Creating),
            llm_credential_ciphertext: llm_credential_ciphertext.into(),
            extra_env_ciphertext: extra_env_ciphertext.into(),
            mcp_servers_json: serde_json::to_string(mcp_servers).unwrap_or_else(|_| "[]".into()),
            instance_type: None,
            worker_id: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Valid project name: `^[a-z0-9]([a-z0-9-]*[a-z0-9])?$`, 1-64 chars —
/// lowercase alphanumeric with interior dashes, never leading or trailing.
pub fn is_valid_project_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    let last = name.chars().next_back().unwrap();
    alnum(first) && alnum(last) && name.chars().all(|c| alnum(c) || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_project_names() {
        assert!(is_valid_project_name("my-project"));
        assert!(is_valid_project_name("a"));
        assert!(is_valid_project_name("proj123"));
    }

    #[test]
    fn invalid_project_names() {
        assert!(!is_valid_project_name(""));
        assert!(!is_valid_project_name("My-Project"));
        assert!(!is_valid_project_name("has_underscore"));
        assert!(!is_valid_project_name(&"a".repeat(65)));
        assert!(!is_valid_project_name("-abc"));
        assert!(!is_valid_project_name("abc-"));
        assert!(!is_valid_project_name("-"));
    }

    #[test]
    fn status_roundtrip() {
        for status in [
            ProjectStatus::Creating,
            ProjectStatus::Provisioning,
            ProjectStatus::Bootstrapping,
            ProjectStatus::Running,
            ProjectStatus::Stopped,
            ProjectStatus::Resizing,
            ProjectStatus::Error,
            ProjectStatus::Terminated,
        ] {
            let s = String::from(status);
            assert_eq!(ProjectStatus::from(s.clone()), status, "{s}");
        }
    }

    #[test]
    fn new_project_defaults_to_creating() {
        let p = NewProject::new("demo", "ct", "et", &[]);
        assert_eq!(p.status, "creating");
        assert!(p.instance_type.is_none());
    }
}
