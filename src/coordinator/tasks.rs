//! # Task Execution Coordinator
//!
//! Owns the active/completed task registries and drives the task status
//! lifecycle. Agents assigned to a started task are notified with one
//! `TaskAssignment` message each, correlated by the task id, through the
//! message router.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use tracing::{debug, warn};

use crate::coordinator::router::MessageRouter;
use crate::event_bus::{Event, EventBus, EventType};
use crate::message::{AgentMessage, MessageType};
use crate::task::{CollaborationMode, Task, TaskStatus};

/// Sender id stamped on coordinator-originated messages.
const COORDINATOR_ID: &str = "task_coordinator";

pub struct TaskCoordinator {
    pub(crate) active: DashMap<String, Task>,
    pub(crate) completed: DashMap<String, Task>,
    router: Arc<MessageRouter>,
    event_bus: Arc<EventBus>,
}

impl TaskCoordinator {
    pub fn new(router: Arc<MessageRouter>, event_bus: Arc<EventBus>) -> Self {
        Self {
            active: DashMap::new(),
            completed: DashMap::new(),
            router,
            event_bus,
        }
    }

    fn emit(&self, event: Event) {
        if let Err(e) = self.event_bus.sync_publish(event) {
            debug!("event publish dropped: {}", e);
        }
    }

    /// Creates a new `Pending` task in the active registry.
    pub fn create_task(
        &self,
        description: &str,
        required_roles: Vec<String>,
        mode: CollaborationMode,
        deadline: Option<chrono::DateTime<Utc>>,
        priority: i32,
    ) -> Task {
        let mut task = Task::new(description, required_roles, mode).with_priority(priority);
        task.deadline = deadline;

        // registry first: a subscriber reacting to the event must be able
        // to look the task up
        self.active.insert(task.id.clone(), task.clone());
        self.emit(
            Event::new(EventType::TaskCreated)
                .with_parameter("task_id", json!(task.id))
                .with_parameter("mode", json!(task.mode.to_string()))
                .with_parameter("priority", json!(priority)),
        );
        task
    }

    /// Assigns agents and moves the task to `Assigned`.
    pub fn assign_task(&self, id: &str, agents: Vec<String>) {
        match self.active.get_mut(id) {
            Some(mut task) => {
                task.assigned_agents = agents;
            }
            None => {
                warn!(task_id = %id, "assign_task: task not in active registry");
                return;
            }
        }
        self.update_task_status(id, TaskStatus::Assigned, None);
    }

    /// Starts an `Assigned` task and notifies each assigned agent.
    ///
    /// Any other current status is a programmer error: logged warning,
    /// no state change. Returns whether the task was started.
    pub fn start_task(&self, id: &str) -> bool {
        let agents = {
            let Some(mut task) = self.active.get_mut(id) else {
                warn!(task_id = %id, "start_task: task not in active registry");
                return false;
            };
            if task.status != TaskStatus::Assigned {
                warn!(
                    task_id = %id,
                    status = %task.status,
                    "start_task requires an assigned task, ignoring"
                );
                return false;
            }
            task.status = TaskStatus::InProgress;
            task.started_at = Some(Utc::now());
            task.assigned_agents.clone()
        };

        self.emit(
            Event::new(EventType::TaskStatusChanged)
                .with_parameter("task_id", json!(id))
                .with_parameter("old_status", json!(TaskStatus::Assigned.to_string()))
                .with_parameter("new_status", json!(TaskStatus::InProgress.to_string()))
                .with_parameter("has_result", json!(false)),
        );

        for agent in agents {
            let message = AgentMessage::builder()
                .sender(COORDINATOR_ID)
                .recipient(&agent)
                .message_type(MessageType::TaskAssignment)
                .correlation_id(id)
                .content("task_id", json!(id))
                .build();
            match message {
                Ok(message) => self.router.send_message(message),
                Err(e) => warn!(task_id = %id, "failed to build assignment message: {}", e),
            }
        }
        true
    }

    /// Records a status transition, optionally attaching a result.
    ///
    /// An unknown id is a logged warning with no state change. A
    /// terminal status moves the task from the active to the completed
    /// registry and stamps the completion time. Every call emits a
    /// `TaskStatusChanged` event.
    pub fn update_task_status(
        &self,
        id: &str,
        status: TaskStatus,
        result: Option<serde_json::Value>,
    ) {
        let has_result = result.is_some();
        let old_status = {
            let Some(mut task) = self.active.get_mut(id) else {
                warn!(task_id = %id, "update_task_status: task not in active registry");
                return;
            };
            let old_status = task.status;
            task.status = status;
            if let Some(result) = result {
                task.results.insert("result".to_string(), result);
            }
            if status.is_terminal() {
                task.completed_at = Some(Utc::now());
            }
            old_status
        };

        if status.is_terminal() {
            if let Some((_, task)) = self.active.remove(id) {
                self.completed.insert(id.to_string(), task);
            }
        }

        debug!(task_id = %id, old = %old_status, new = %status, "task status changed");
        self.emit(
            Event::new(EventType::TaskStatusChanged)
                .with_parameter("task_id", json!(id))
                .with_parameter("old_status", json!(old_status.to_string()))
                .with_parameter("new_status", json!(status.to_string()))
                .with_parameter("has_result", json!(has_result)),
        );
    }

    /// Cancels a task via the normal status-update path.
    pub fn cancel_task(&self, id: &str) {
        self.update_task_status(id, TaskStatus::Cancelled, None);
    }

    /// Returns the attached result only for a `Completed` task.
    ///
    /// Not-found and not-yet-complete are both `None`: callers cannot
    /// distinguish them, by design.
    pub fn get_task_result(&self, id: &str) -> Option<serde_json::Value> {
        self.get_task(id).and_then(|task| {
            if task.status == TaskStatus::Completed {
                task.results.get("result").cloned()
            } else {
                None
            }
        })
    }

    /// Looks a task up in either registry.
    pub fn get_task(&self, id: &str) -> Option<Task> {
        self.active
            .get(id)
            .map(|t| t.clone())
            .or_else(|| self.completed.get(id).map(|t| t.clone()))
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }
}
