//! # Agent Messages
//!
//! Messages are the unit of communication between agents and the
//! coordination layer. Each message carries a closed type tag, a JSON
//! content map and an optional correlation id linking a response back to
//! the request that triggered it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A discrete message exchanged between agents.
///
/// Messages are plain data records, serializable to JSON for transports
/// and dashboards. The `correlation_id` links a response to the request
/// it answers; when absent, the message's own id acts as the correlation
/// id (see [`AgentMessage::correlation_id`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Globally unique message id (UUID v4).
    pub id: String,
    /// Identifier of the sending agent or component.
    pub sender: String,
    /// Target agent, or `None` for broadcast-style messages.
    pub recipient: Option<String>,
    pub message_type: MessageType,
    /// Message payload as key-value pairs.
    pub content: HashMap<String, serde_json::Value>,
    /// Correlation id for request/response matching. Defaults to `id`.
    pub correlation_id: Option<String>,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

/// Closed set of message kinds understood by the routing layer.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskAssignment,
    TaskResponse,
    TaskCompletion,
    AnalysisRequest,
    AnalysisResponse,
    DecisionProposal,
    DecisionFeedback,
    DecisionVote,
    StatusUpdate,
    Heartbeat,
    ErrorReport,
    CollaborationRequest,
    CollaborationResponse,
}

impl AgentMessage {
    pub fn new(sender: &str, message_type: MessageType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            recipient: None,
            message_type,
            content: HashMap::new(),
            correlation_id: None,
            priority: 0,
            created_at: Utc::now(),
        }
    }

    pub fn builder() -> MessageBuilder {
        MessageBuilder::new()
    }

    /// Effective correlation id: the explicit one if set, else the
    /// message's own id. At most one outstanding request may be keyed by
    /// a given correlation id at a time.
    pub fn correlation_id(&self) -> &str {
        self.correlation_id.as_deref().unwrap_or(&self.id)
    }

    /// Builds a response to this message, carrying its correlation id so
    /// the router can resolve the pending request.
    pub fn response(&self, sender: &str, message_type: MessageType) -> Self {
        Self {
            recipient: Some(self.sender.clone()),
            correlation_id: Some(self.correlation_id().to_string()),
            ..Self::new(sender, message_type)
        }
    }
}

#[derive(Default)]
pub struct MessageBuilder {
    sender: Option<String>,
    recipient: Option<String>,
    message_type: Option<MessageType>,
    content: HashMap<String, serde_json::Value>,
    correlation_id: Option<String>,
    priority: i32,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn sender(mut self, sender: &str) -> Self {
        self.sender = Some(sender.to_string());
        self
    }

    pub fn recipient(mut self, recipient: &str) -> Self {
        self.recipient = Some(recipient.to_string());
        self
    }

    pub fn message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    pub fn content(mut self, key: &str, value: serde_json::Value) -> Self {
        self.content.insert(key.to_string(), value);
        self
    }

    pub fn correlation_id(mut self, correlation_id: &str) -> Self {
        self.correlation_id = Some(correlation_id.to_string());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn build(self) -> crate::error::CoordinationResult<AgentMessage> {
        let sender = self
            .sender
            .ok_or_else(|| crate::error::Error::builder("sender is required"))?;
        let message_type = self
            .message_type
            .ok_or_else(|| crate::error::Error::builder("message_type is required"))?;
        Ok(AgentMessage {
            id: Uuid::new_v4().to_string(),
            sender,
            recipient: self.recipient,
            message_type,
            content: self.content,
            correlation_id: self.correlation_id,
            priority: self.priority,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_correlation_defaults_to_own_id() {
        let message = AgentMessage::new("agent_a", MessageType::Heartbeat);
        assert_eq!(message.correlation_id(), message.id);
    }

    #[test]
    fn test_response_carries_correlation() {
        let request = AgentMessage::builder()
            .sender("agent_a")
            .recipient("agent_b")
            .message_type(MessageType::AnalysisRequest)
            .content("symbol", serde_json::json!("NKY"))
            .build()
            .unwrap();

        let response = request.response("agent_b", MessageType::AnalysisResponse);
        assert_eq!(response.correlation_id(), request.id);
        assert_eq!(response.recipient, Some("agent_a".to_string()));
    }

    #[test]
    fn test_builder_requires_sender_and_type() {
        assert!(MessageBuilder::new().build().is_err());
        assert!(MessageBuilder::new().sender("a").build().is_err());
        assert!(MessageBuilder::new()
            .sender("a")
            .message_type(MessageType::Heartbeat)
            .build()
            .is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let message = AgentMessage::builder()
            .sender("agent_a")
            .message_type(MessageType::StatusUpdate)
            .content("status", serde_json::json!("ready"))
            .priority(3)
            .build()
            .unwrap();

        let json = serde_json::to_string(&message).unwrap();
        let back: AgentMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }
}
