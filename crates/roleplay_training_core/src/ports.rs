//! crates/roleplay_training_core/src/ports.rs
//!
//! Defines the service contracts (traits) the training core depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific implementations like databases or LLM APIs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{AiStaff, Guideline, KnowledgeEntry, Message, Scenario, TrainingSession};

//=========================================================================================
// Port Error and Result Types
//=========================================================================================

/// A generic error type for persistence port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// A failed call to the upstream text-generation capability.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("API error: {status}{}", body_suffix(.body))]
    Status { status: u16, body: String },
    #[error("generation was rejected by the upstream API: {0}")]
    Rejected(String),
    #[error("Invalid API response: {0}")]
    Malformed(String),
    #[error("request failed: {0}")]
    Transport(String),
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" ({body})")
    }
}

pub type GenerationResult<T> = Result<T, GenerationError>;

//=========================================================================================
// Generation Requests
//=========================================================================================

/// Everything the staff endpoint needs to produce one staff reply.
#[derive(Debug, Clone)]
pub struct StaffTurnRequest {
    /// The fully assembled instruction prompt.
    pub prompt: String,
    pub customer_message: String,
    pub history: Vec<Message>,
    pub customer_persona: String,
    pub scenario_description: String,
    pub knowledge_base: Vec<KnowledgeEntry>,
    pub guidelines: Vec<Guideline>,
}

/// Everything the customer endpoint needs to produce one customer reaction.
#[derive(Debug, Clone)]
pub struct CustomerTurnRequest {
    /// The fully assembled instruction prompt.
    pub prompt: String,
    pub scenario: Scenario,
    pub staff_message: String,
    pub history: Vec<Message>,
    pub turn: u32,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait StaffResponseService: Send + Sync {
    /// Generates the staff persona's next utterance.
    async fn respond(&self, request: &StaffTurnRequest) -> GenerationResult<String>;
}

#[async_trait]
pub trait CustomerSimulationService: Send + Sync {
    /// Generates the customer's first message of a session.
    async fn open_conversation(&self, prompt: &str) -> GenerationResult<String>;

    /// Generates the customer's reaction to the latest staff message.
    async fn react(&self, request: &CustomerTurnRequest) -> GenerationResult<String>;
}

/// Whole-record persistence for staff, scenarios and sessions.
#[async_trait]
pub trait TrainingStore: Send + Sync {
    // --- AI Staff ---
    async fn load_ai_staff(&self) -> PortResult<Vec<AiStaff>>;

    async fn save_ai_staff(&self, staff: &AiStaff) -> PortResult<()>;

    async fn delete_ai_staff(&self, staff_id: Uuid) -> PortResult<()>;

    // --- Scenarios ---
    async fn load_scenarios(&self) -> PortResult<Vec<Scenario>>;

    /// Upserts a scenario and returns it as stored.
    async fn save_scenario(&self, scenario: &Scenario) -> PortResult<Scenario>;

    async fn delete_scenario(&self, scenario_id: Uuid) -> PortResult<()>;

    // --- Sessions ---
    async fn load_sessions(&self) -> PortResult<Vec<TrainingSession>>;

    async fn save_session(&self, session: &TrainingSession) -> PortResult<()>;

    async fn delete_session(&self, session_id: Uuid) -> PortResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_mentions_code_and_body() {
        let err = GenerationError::Status {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "API error: 502 (bad gateway)");

        let bare = GenerationError::Status {
            status: 500,
            body: String::new(),
        };
        assert_eq!(bare.to_string(), "API error: 500");
    }
}
