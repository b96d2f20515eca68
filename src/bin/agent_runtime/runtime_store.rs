//! Task-document and memory-file persistence, backed directly by the
//! sandbox workspace filesystem.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use mesoclaw_fleet::supervisor::driver::TaskStore;
use mesoclaw_fleet::supervisor::task::{self, Task};

const TASK_FILENAME: &str = ".task.json";
const MEMORY_FILES: [&str; 2] = ["SHORT_TERM_MEMORY.md", "LONG_TERM_MEMORY.md"];
const PLAN_FILENAME: &str = "plan.md";
const DIRECTIVES_FILENAME: &str = ".operator-directives.json";

pub struct FileTaskStore {
    workspace: std::path::PathBuf,
}

impl FileTaskStore {
    pub fn new(workspace: &str) -> Self {
        Self { workspace: std::path::PathBuf::from(workspace) }
    }

    fn task_path(&self) -> std::path::PathBuf {
        self.workspace.join(TASK_FILENAME)
    }

    async fn read_optional(&self, name: &str) -> String {
        tokio::fs::read_to_string(self.workspace.join(name)).await.unwrap_or_default()
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn load(&self) -> Result<Task, String> {
        let raw = tokio::fs::read_to_string(self.task_path())
            .await
            .map_err(|e| format!("reading task document: {e}"))?;
        task::load(&raw).map_err(|e| e.to_string())
    }

    async fn save(&self, task: &Task) -> Result<(), String> {
        let raw = task::save(task).map_err(|e| e.to_string())?;
        tokio::fs::write(self.task_path(), raw).await.map_err(|e| format!("writing task document: {e}"))
    }

    /// No memory file is required to exist yet; a missing file just hashes
    /// as empty, so the reminder tracker sees a stable baseline.
    async fn memory_hash(&self) -> Result<String, String> {
        let mut hasher = Sha256::new();
        for name in MEMORY_FILES {
            let contents = tokio::fs::read(self.workspace.join(name)).await.unwrap_or_default();
            hasher.update(&contents);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    async fn memory_contents(&self) -> Result<(String, String), String> {
        Ok((self.read_optional(MEMORY_FILES[0]).await, self.read_optional(MEMORY_FILES[1]).await))
    }

    async fn plan(&self) -> Result<String, String> {
        Ok(self.read_optional(PLAN_FILENAME).await)
    }

    /// `.operator-directives.json` holds `[{"id", "text", "createdAt"}, ...]`,
    /// the same shape ControlAPI's directive endpoints write; only the text
    /// matters to the prompt.
    async fn operator_directives(&self) -> Result<Vec<String>, String> {
        let raw = self.read_optional(DIRECTIVES_FILENAME).await;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let entries: Vec<serde_json::Value> =
            serde_json::from_str(&raw).map_err(|e| format!("parsing operator directives: {e}"))?;
        Ok(entries.iter().filter_map(|v| v.get("text").and_then(|t| t.as_str()).map(str::to_owned)).collect())
    }
}
