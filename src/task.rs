//! # Collaboration Tasks
//!
//! A task is a unit of work requiring one or more agents, tracked through
//! an explicit status lifecycle:
//!
//! ```text
//! pending → assigned → in_progress → {completed | failed | cancelled}
//! ```
//!
//! Status transitions are monotonic toward a terminal state. A task lives
//! in exactly one of two registries owned by the task coordinator,
//! "active" or "completed", never both.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Globally unique task id (UUID v4).
    pub id: String,
    pub description: String,
    /// Roles an agent must cover for this task, in required order.
    pub required_roles: Vec<String>,
    pub mode: CollaborationMode,
    pub status: TaskStatus,
    pub assigned_agents: Vec<String>,
    /// Accumulated per-agent results, keyed by agent id (or `"result"`
    /// for a single consolidated outcome).
    pub results: HashMap<String, serde_json::Value>,
    pub deadline: Option<DateTime<Utc>>,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    WaitingForAgents,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses end the lifecycle; the task moves to the
    /// completed registry the moment one is reached.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// How the assigned agents are expected to work the task.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CollaborationMode {
    Sequential,
    Parallel,
    Consensus,
    Competitive,
    Hierarchical,
}

impl Task {
    pub fn new(description: &str, required_roles: Vec<String>, mode: CollaborationMode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.to_string(),
            required_roles,
            mode,
            status: TaskStatus::Pending,
            assigned_agents: Vec::new(),
            results: HashMap::new(),
            deadline: None,
            priority: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether the deadline has elapsed relative to `now`. Strictly
    /// earlier than `now` counts as exceeded.
    pub fn deadline_exceeded(&self, now: DateTime<Utc>) -> bool {
        self.deadline.map(|d| d < now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_task_is_pending() {
        let task = Task::new("analyze portfolio", vec!["analyst".to_string()], CollaborationMode::Sequential);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assigned_agents.is_empty());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(!TaskStatus::WaitingForAgents.is_terminal());
    }

    #[test]
    fn test_deadline_exceeded_is_strict() {
        let now = Utc::now();
        let task = Task::new("t", vec![], CollaborationMode::Parallel);
        assert!(!task.deadline_exceeded(now));

        let past = task.clone().with_deadline(now - Duration::seconds(1));
        assert!(past.deadline_exceeded(now));

        let exact = task.clone().with_deadline(now);
        assert!(!exact.deadline_exceeded(now));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::WaitingForAgents).unwrap();
        assert_eq!(json, "\"waiting_for_agents\"");
        assert_eq!(TaskStatus::InProgress.to_string(), "in_progress");
    }
}
