//! The task document: an append-only-ish JSON file living in the sandbox
//! workspace that describes the agent's current workload.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Measurable,
    Subjective,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GoalDirection {
    Above,
    Below,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskGoal {
    pub description: String,
    #[serde(default)]
    pub verify_command: Option<String>,
    #[serde(default)]
    pub target_value: Option<f64>,
    #[serde(default)]
    pub direction: Option<GoalDirection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLimits {
    #[serde(default = "default_max_idle_turns")]
    pub max_idle_turns: u32,
    #[serde(default)]
    pub max_duration_hours: Option<f64>,
    #[serde(default)]
    pub max_turns: Option<u32>,
}

fn default_max_idle_turns() -> u32 {
    20
}

impl Default for TaskLimits {
    fn default() -> Self {
        Self {
            max_idle_turns: default_max_idle_turns(),
            max_duration_hours: None,
            max_turns: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Stopped,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    Verified,
    IdleTimeout,
    TimeLimit,
    TurnLimit,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    #[serde(default)]
    pub turns_completed: u64,
    #[serde(default)]
    pub last_active_at: Option<String>,
    #[serde(default)]
    pub latest_metric: Option<f64>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskContext {
    #[serde(default)]
    pub prompt_prepends: Vec<String>,
    #[serde(default)]
    pub prompt_appends: Vec<String>,
    #[serde(default)]
    pub process_monitor_patterns: Vec<String>,
    #[serde(default)]
    pub progress_commands: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionPriority {
    Question,
    Blocking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub context: Option<String>,
    pub priority: QuestionPriority,
    pub asked_at: String,
    #[serde(default)]
    pub answered_at: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
}

impl Question {
    pub fn is_answered(&self) -> bool {
        self.answered_at.is_some() && self.answer.is_some()
    }

    pub fn is_blocking_and_unanswered(&self) -> bool {
        matches!(self.priority, QuestionPriority::Blocking) && !self.is_answered()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub goal: TaskGoal,
    #[serde(default)]
    pub limits: TaskLimits,
    pub status: TaskStatus,
    pub started_at: String,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub completion_reason: Option<CompletionReason>,
    #[serde(default)]
    pub progress: TaskProgress,
    #[serde(default)]
    pub context: TaskContext,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task document is not valid JSON: {0}")]
    Parse(String),
    #[error("task I/O error: {0}")]
    Io(String),
}

pub fn load(raw: &str) -> Result<Task, TaskError> {
    serde_json::from_str(raw).map_err(|e| TaskError::Parse(e.to_string()))
}

pub fn save(task: &Task) -> Result<String, TaskError> {
    serde_json::to_string_pretty(task).map_err(|e| TaskError::Parse(e.to_string()))
}

impl Task {
    /// Unanswered blocking questions, in document order.
    pub fn blocking_unanswered(&self) -> Vec<&Question> {
        self.questions.iter().filter(|q| q.is_blocking_and_unanswered()).collect()
    }

    /// Questions answered since `since_snapshot` (by id membership), in document order.
    pub fn newly_answered<'a>(&'a self, since_snapshot: &[String]) -> Vec<&'a Question> {
        self.questions
            .iter()
            .filter(|q| q.is_answered() && !since_snapshot.contains(&q.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        Task {
            id: "t-1".into(),
            name: "demo".into(),
            description: "desc".into(),
            task_type: TaskType::Measurable,
            goal: TaskGoal {
                description: "increase throughput".into(),
                verify_command: Some("cat metric.txt".into()),
                target_value: Some(100.0),
                direction: Some(GoalDirection::Above),
            },
            limits: TaskLimits::default(),
            status: TaskStatus::Running,
            started_at: "2026-01-01T00:00:00Z".into(),
            completed_at: None,
            completion_reason: None,
            progress: TaskProgress::default(),
            context: TaskContext::default(),
            questions: vec![],
        }
    }

    #[test]
    fn roundtrip_through_json() {
        let task = sample_task();
        let json = save(&task).unwrap();
        let loaded = load(&json).unwrap();
        assert_eq!(loaded.id, task.id);
        assert_eq!(loaded.limits.max_idle_turns, 20);
    }

    #[test]
    fn blocking_unanswered_filters_correctly() {
        let mut task = sample_task();
        task.questions = vec![
            Question {
                id: "q1".into(),
                text: "ok?".into(),
                context: None,
                priority: QuestionPriority::Question,
                asked_at: "now".into(),
                answered_at: None,
                answer: None,
            },
            Question {
                id: "q2".into(),
                text: "blocking?".into(),
                context: None,
                priority: QuestionPriority::Blocking,
                asked_at: "now".into(),
                answered_at: None,
                answer: None,
            },
            Question {
                id: "q3".into(),
                text: "answered blocking".into(),
                context: None,
                priority: QuestionPriority::Blocking,
                asked_at: "now".into(),
                answered_at: Some("later".into()),
                answer: Some("yes".into()),
            },
        ];
        let unanswered = task.blocking_unanswered();
        assert_eq!(unanswered.len(), 1);
        assert_eq!(unanswered[0].id, "q2");
    }

    #[test]
    fn newly_answered_excludes_previously_seen() {
        let mut task = sample_task();
        task.questions = vec![Question {
            id: "q1".into(),
            text: "t".into(),
            context: None,
            priority: QuestionPriority::Question,
            asked_at: "now".into(),
            answered_at: Some("later".into()),
            answer: Some("a".into()),
        }];
        assert_eq!(task.newly_answered(&[]).len(), 1);
        assert_eq!(task.newly_answered(&["q1".to_string()]).len(), 0);
    }
}
