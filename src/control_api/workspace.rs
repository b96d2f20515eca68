//! Workspace file access for ControlAPI endpoints that read or write
//! canonical project files (`memory`, `logs`, `task`, `directives`).
//! These are not Store rows, so they go through [`ContainerManager::exec`]
//! the same way WorkerAgent's own `workspace` module does, since `exec`
//! already transparently routes local-vs-remote.

use crate::container_manager::ContainerManager;

const EXEC_TIMEOUT_SECS: u64 = 10;

const TASK_DOCUMENT_PATH: &str = "/workspace/.task.json";
const MEMORY_FILES: [&str; 3] = [
    "/workspace/SHORT_TERM_MEMORY.md",
    "/workspace/LONG_TERM_MEMORY.md",
    "/workspace/plan.md",
];
const SUPERVISOR_LOG_PATH: &str = "/workspace/.supervisor.log";
const DIRECTIVES_PATH: &str = "/workspace/.operator-directives.json";

fn shell_single_quote_escape(s: &str) -> String {
    s.replace('\'', "'\\''")
}

async fn write_file(containers: &ContainerManager, project_name: &str, path: &str, content: &str) -> Result<(), String> {
    let escaped = shell_single_quote_escape(content);
    let command = format!("printf '%s' '{escaped}' > {path}");
    let argv = vec!["sh".to_owned(), "-c".to_owned(), command];
    let (exit_code, _stdout, stderr) = containers.exec(project_name, &argv, EXEC_TIMEOUT_SECS).await?;
    if exit_code != 0 {
        return Err(format!("write {path} failed: {stderr}"));
    }
    Ok(())
}

async fn read_file(containers: &ContainerManager, project_name: &str, path: &str) -> Result<String, String> {
    let argv = vec!["cat".to_owned(), path.to_owned()];
    let (exit_code, stdout, stderr) = containers.exec(project_name, &argv, EXEC_TIMEOUT_SECS).await?;
    if exit_code != 0 {
        return Err(format!("read {path} failed: {stderr}"));
    }
    Ok(stdout)
}

async fn tail_file(containers: &ContainerManager, project_name: &str, path: &str, lines: u32) -> Result<String, String> {
    let argv = vec!["tail".to_owned(), "-n".to_owned(), lines.to_string(), path.to_owned()];
    let (_exit_code, stdout, _stderr) = containers.exec(project_name, &argv, EXEC_TIMEOUT_SECS).await?;
    Ok(stdout)
}

pub async fn read_task(containers: &ContainerManager, project_name: &str) -> Result<Option<serde_json::Value>, String> {
    match read_file(containers, project_name, TASK_DOCUMENT_PATH).await {
        Ok(content) if !content.trim().is_empty() => serde_json::from_str(&content).map(Some).map_err(|e| e.to_string()),
        _ => Ok(None),
    }
}

pub async fn write_task(containers: &ContainerManager, project_name: &str, task: &serde_json::Value) -> Result<(), String> {
    let body = serde_json::to_string(task).map_err(|e| e.to_string())?;
    write_file(containers, project_name, TASK_DOCUMENT_PATH, &body).await
}

pub async fn read_memory(containers: &ContainerManager, project_name: &str) -> Result<serde_json::Value, String> {
    let mut out = serde_json::Map::new();
    for path in MEMORY_FILES {
        let content = read_file(containers, project_name, path).await.unwrap_or_default();
        let name = path.rsplit('/').next().unwrap_or(path);
        out.insert(name.to_owned(), serde_json::Value::String(content));
    }
    Ok(serde_json::Value::Object(out))
}

pub async fn read_logs(containers: &ContainerManager, project_name: &str, lines: u32) -> Result<String, String> {
    tail_file(containers, project_name, SUPERVISOR_LOG_PATH, lines).await
}

pub async fn read_directives(containers: &ContainerManager, project_name: &str) -> Result<Vec<serde_json::Value>, String> {
    match read_file(containers, project_name, DIRECTIVES_PATH).await {
        Ok(content) if !content.trim().is_empty() => serde_json::from_str(&content).map_err(|e| e.to_string()),
        _ => Ok(Vec::new()),
    }
}

pub async fn write_directives(containers: &ContainerManager, project_name: &str, directives: &[serde_json::Value]) -> Result<(), String> {
    let body = serde_json::to_string(directives).map_err(|e| e.to_string())?;
    write_file(containers, project_name, DIRECTIVES_PATH, &body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_embedded_single_quotes() {
        assert_eq!(shell_single_quote_escape("it's a test"), "it'\\''s a test");
    }
}
