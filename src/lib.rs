//! # Renraku
//!
//! A resilient broadcast and coordination layer for multi-agent
//! systems. Four cooperating components share one event bus:
//!
//! - [`broadcast::BroadcastMonitor`] wraps an unreliable delivery
//!   transport with a circuit breaker, health metrics, backpressure
//!   queueing, and an escalating recovery ladder. Its `broadcast`
//!   entry point reports success or failure as a boolean and never
//!   propagates a transport error to the caller.
//! - [`coordinator::MessageRouter`] feeds an unbounded mailbox through
//!   a single consumer into type-keyed handler lists, with
//!   correlation-id request/response on top.
//! - [`coordinator::TaskCoordinator`] and
//!   [`coordinator::MaintenanceCoordinator`] own the task lifecycle:
//!   creation through terminal status, deadline sweeps, and retention
//!   cleanup.
//! - [`coordinator::QueueCoordinator`] runs fixed named work queues
//!   sequentially or under a concurrency bound with per-queue error
//!   isolation.

pub mod broadcast;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event_bus;
pub mod message;
pub mod task;

pub use broadcast::{BroadcastMonitor, BroadcastTransport, HealthSnapshot, TransportError};
pub use config::CoordinationConfig;
pub use coordinator::{
    MaintenanceCoordinator, MessageHandler, MessageRouter, QueueCoordinator, QueueRunner,
    TaskCoordinator,
};
pub use error::{CoordinationResult, Error};
pub use event_bus::{ErrorEvent, ErrorSeverity, Event, EventBus, EventType};
pub use message::{AgentMessage, MessageType};
pub use task::{CollaborationMode, Task, TaskStatus};
