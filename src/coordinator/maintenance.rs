//! # Maintenance Coordinator
//!
//! Periodic housekeeping over the task registries: fails in-progress
//! tasks whose deadline has passed and purges completed tasks past the
//! configured retention age. Both sweeps are also callable directly,
//! which keeps them testable without the timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::TaskConfig;
use crate::coordinator::tasks::TaskCoordinator;
use crate::task::TaskStatus;

pub struct MaintenanceCoordinator {
    tasks: Arc<TaskCoordinator>,
    config: TaskConfig,
    running: Arc<AtomicBool>,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MaintenanceCoordinator {
    pub fn new(tasks: Arc<TaskCoordinator>, config: TaskConfig) -> Self {
        Self {
            tasks,
            config,
            running: Arc::new(AtomicBool::new(false)),
            sweep_handle: Mutex::new(None),
        }
    }

    /// Fails every in-progress task whose deadline is strictly past.
    ///
    /// Only `InProgress` tasks are swept, so a task already failed by a
    /// previous sweep sits in the completed registry and is never
    /// flagged twice. Returns the ids failed by this call.
    pub fn check_task_deadlines(&self) -> Vec<String> {
        let now = Utc::now();
        let expired: Vec<String> = self
            .tasks
            .active
            .iter()
            .filter(|entry| {
                entry.status == TaskStatus::InProgress && entry.deadline_exceeded(now)
            })
            .map(|entry| entry.id.clone())
            .collect();

        for id in &expired {
            warn!(task_id = %id, "task deadline exceeded, marking failed");
            self.tasks.update_task_status(
                id,
                TaskStatus::Failed,
                Some(json!({"error": "deadline_exceeded"})),
            );
        }
        expired
    }

    /// Purges completed-registry tasks older than `max_age_hours`.
    ///
    /// Age is measured from completion time, falling back to creation
    /// time for entries that never got stamped. Returns the purge count.
    pub fn cleanup_old_tasks(&self, max_age_hours: u64) -> usize {
        let cutoff = Utc::now() - ChronoDuration::hours(max_age_hours as i64);
        let before = self.tasks.completed.len();
        self.tasks
            .completed
            .retain(|_, task| task.completed_at.unwrap_or(task.created_at) >= cutoff);
        let purged = before - self.tasks.completed.len();
        if purged > 0 {
            info!(purged, "purged old completed tasks");
        }
        purged
    }

    /// Spawns the periodic sweep loop.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let tasks = self.tasks.clone();
        let config = self.config.clone();
        let running = self.running.clone();
        let sweeper = Self {
            tasks,
            config: config.clone(),
            running: running.clone(),
            sweep_handle: Mutex::new(None),
        };

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.maintenance_interval);
            // the first tick fires immediately, skip it
            interval.tick().await;
            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                let failed = sweeper.check_task_deadlines();
                let purged = sweeper.cleanup_old_tasks(config.max_task_age_hours);
                debug!(failed = failed.len(), purged, "maintenance sweep done");
            }
        });
        *self.sweep_handle.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.sweep_handle.lock().await.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
