//! # Coordination Primitives
//!
//! The coordinators own the asynchronous plumbing agents ride on. Each
//! coordinator owns a specific slice of state and the single consumer
//! task that mutates it, exposing a narrow API to the rest of the
//! system.
//!
//! ## Message Flow
//!
//! ```text
//! ┌────────┐ send_message  ┌───────────────┐  dispatch   ┌──────────┐
//! │ Sender │──────────────▶│ MessageRouter │────────────▶│ Handlers │
//! └────────┘               └───────┬───────┘             └──────────┘
//!                                  │ correlation match
//!                           ┌──────▼──────────┐
//!                           │ pending request │──▶ resolves awaiting
//!                           └─────────────────┘    requester
//! ```
//!
//! Messages submitted through one router's `send_message` are processed
//! by that router's single consumer in strict enqueue (FIFO) order. A
//! message whose correlation id points at an outstanding request resolves
//! that request's future instead of being dispatched to type handlers.
//!
//! ## Task Lifecycle
//!
//! [`tasks::TaskCoordinator`] tracks collaboration tasks through
//! `pending → assigned → in_progress → {completed | failed | cancelled}`,
//! notifying assigned agents through the router.
//! [`maintenance::MaintenanceCoordinator`] periodically fails tasks whose
//! deadlines elapsed and purges old completed tasks.
//! [`queues::QueueCoordinator`] runs a fixed set of named work queues
//! either strictly sequentially or with bounded concurrency.

pub mod maintenance;
pub mod queues;
pub mod router;
pub mod tasks;

pub use maintenance::MaintenanceCoordinator;
pub use queues::{QueueCoordinator, QueueError, QueueOutcome, QueueRunner};
pub use router::{MessageHandler, MessageRouter, RouterError, RouterResult};
pub use tasks::TaskCoordinator;
