//! # Broadcast Health Monitoring
//!
//! Wraps a caller-supplied delivery transport with the classic resilience
//! patterns: failure classification, circuit breaking, backpressure with
//! bounded queuing, and multi-strategy recovery.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────┐  broadcast()   ┌──────────────────┐  deliver()  ┌───────────┐
//! │ Caller │───────────────▶│ BroadcastMonitor │────────────▶│ Transport │
//! └────────┘    -> bool     └──────────────────┘             └───────────┘
//!                             │        │      │
//!                      ┌──────▼──┐ ┌───▼────┐ ┌▼─────────┐
//!                      │ Circuit │ │Metrics │ │ Recovery │
//!                      └─────────┘ └────────┘ └──────────┘
//! ```
//!
//! The single public entry point is [`BroadcastMonitor::broadcast`], which
//! returns `bool` and never raises: every transport failure is absorbed
//! locally, classified and recorded. When the consecutive-failure
//! threshold is hit, the circuit opens and a background recovery task is
//! launched.
//!
//! ## Failure Classification
//!
//! Failures are classified by keyword families in the error text:
//! connection/network/timeout are High severity, client/websocket/closed
//! are Medium, memory/disk/system are Critical, everything else defaults
//! to Medium. Severity drives logging and alerting only; the circuit
//! threshold logic counts failures regardless of class.

pub mod circuit;
pub mod classify;
pub mod metrics;
pub mod monitor;
pub mod recovery;

pub use circuit::CircuitBreaker;
pub use classify::classify_failure;
pub use metrics::{DeliveryError, HealthMetrics, HealthSnapshot};
pub use monitor::{BroadcastMonitor, BroadcastTransport, TransportError};
pub use recovery::RecoveryStrategy;
