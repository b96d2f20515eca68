//! Task-limit and goal-verification enforcement, evaluated at the end of
//! every turn.

use super::task::{CompletionReason, GoalDirection, Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitBreach {
    IdleTimeout,
    TimeLimit,
    TurnLimit,
}

impl LimitBreach {
    pub fn reason(self) -> CompletionReason {
        match self {
            LimitBreach::IdleTimeout => CompletionReason::IdleTimeout,
            LimitBreach::TimeLimit => CompletionReason::TimeLimit,
            LimitBreach::TurnLimit => CompletionReason::TurnLimit,
        }
    }
}

/// Check the task's limits against current counters. `turns_with_no_progress`
/// and `running_hours` are tracked by the driver outside the task document.
pub fn check_limits(task: &Task, turns_with_no_progress: u32, running_hours: f64) -> Option<LimitBreach> {
    if turns_with_no_progress >= task.limits.max_idle_turns {
        return Some(LimitBreach::IdleTimeout);
    }
    if let Some(max_hours) = task.limits.max_duration_hours {
        if running_hours >= max_hours {
            return Some(LimitBreach::TimeLimit);
        }
    }
    if let Some(max_turns) = task.limits.max_turns {
        if task.progress.turns_completed >= max_turns as u64 {
            return Some(LimitBreach::TurnLimit);
        }
    }
    None
}

/// Whether a periodic verification sweep should run this turn (every 10
/// productive turns, only while a `verify_command` is configured).
pub fn should_run_periodic_verify(task: &Task, productive_turns_since_last_verify: u32) -> bool {
    task.status == TaskStatus::Running
        && task.goal.verify_command.is_some()
        && productive_turns_since_last_verify > 0
        && productive_turns_since_last_verify % 10 == 0
}

/// Parse verify-command stdout as a number and compare it against the goal's
/// target using its direction. `None` direction/target never passes.
pub fn verify_passes(stdout: &str, target_value: Option<f64>, direction: Option<GoalDirection>) -> bool {
    let (Some(target), Some(direction)) = (target_value, direction) else {
        return false;
    };
    let Ok(actual) = stdout.trim().parse::<f64>() else {
        return false;
    };
    match direction {
        GoalDirection::Above => actual > target,
        GoalDirection::Below => actual < target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::task::{TaskContext, TaskGoal, TaskLimits, TaskProgress, TaskType};

    fn task_with_limits(limits: TaskLimits) -> Task {
        Task {
            id: "t".into(),
            name: "t".into(),
            description: "d".into(),
            task_type: TaskType::Measurable,
            goal: TaskGoal {
                description: "g".into(),
                verify_command: Some("cat m".into()),
                target_value: Some(100.0),
                direction: Some(GoalDirection::Above),
            },
            limits,
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
    fn idle_timeout_breach() {
        let task = task_with_limits(TaskLimits { max_idle_turns: 5, ..Default::default() });
        assert_eq!(check_limits(&task, 5, 0.0), Some(LimitBreach::IdleTimeout));
        assert_eq!(check_limits(&task, 4, 0.0), None);
    }

    #[test]
    fn time_limit_breach() {
        let task = task_with_limits(TaskLimits { max_duration_hours: Some(2.0), ..Default::default() });
        assert_eq!(check_limits(&task, 0, 2.5), Some(LimitBreach::TimeLimit));
    }

    #[test]
    fn turn_limit_breach() {
        let mut task = task_with_limits(TaskLimits { max_turns: Some(3), ..Default::default() });
        task.progress.turns_completed = 3;
        assert_eq!(check_limits(&task, 0, 0.0), Some(LimitBreach::TurnLimit));
    }

    #[test]
    fn verify_above_direction() {
        assert!(verify_passes("150", Some(100.0), Some(GoalDirection::Above)));
        assert!(!verify_passes("50", Some(100.0), Some(GoalDirection::Above)));
    }

    #[test]
    fn verify_below_direction() {
        assert!(verify_passes("5", Some(10.0), Some(GoalDirection::Below)));
        assert!(!verify_passes("15", Some(10.0), Some(GoalDirection::Below)));
    }

    #[test]
    fn verify_rejects_unparseable_output() {
        assert!(!verify_passes("not-a-number", Some(10.0), Some(GoalDirection::Above)));
    }

    #[test]
    fn periodic_verify_fires_every_10_turns() {
        let task = task_with_limits(TaskLimits::default());
        assert!(!should_run_periodic_verify(&task, 5));
        assert!(should_run_periodic_verify(&task, 10));
        assert!(should_run_periodic_verify(&task, 20));
    }
}
