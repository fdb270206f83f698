//! crates/roleplay_training_core/src/domain.rs
//!
//! Defines the pure, core data structures for roleplay training.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::memory::TrainingMemory;

/// Returned when a stored or transmitted string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

//=========================================================================================
// Roles and Tiers
//=========================================================================================

/// The job an AI staff member is trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaffRole {
    Coach,
    Sales,
    CustomerService,
    Scientist,
}

impl StaffRole {
    pub const ALL: [StaffRole; 4] = [
        StaffRole::Coach,
        StaffRole::Sales,
        StaffRole::CustomerService,
        StaffRole::Scientist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Coach => "coach",
            StaffRole::Sales => "sales",
            StaffRole::CustomerService => "customer-service",
            StaffRole::Scientist => "scientist",
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StaffRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coach" => Ok(StaffRole::Coach),
            "sales" => Ok(StaffRole::Sales),
            "customer-service" => Ok(StaffRole::CustomerService),
            "scientist" => Ok(StaffRole::Scientist),
            other => Err(UnknownVariant::new("staff role", other)),
        }
    }
}

/// How hard a customer persona is to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonaDifficulty {
    Easy,
    Medium,
    Hard,
}

impl PersonaDifficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaDifficulty::Easy => "Easy",
            PersonaDifficulty::Medium => "Medium",
            PersonaDifficulty::Hard => "Hard",
        }
    }
}

/// The difficulty tier of a training scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioDifficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl ScenarioDifficulty {
    pub const ALL: [ScenarioDifficulty; 3] = [
        ScenarioDifficulty::Beginner,
        ScenarioDifficulty::Intermediate,
        ScenarioDifficulty::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioDifficulty::Beginner => "Beginner",
            ScenarioDifficulty::Intermediate => "Intermediate",
            ScenarioDifficulty::Advanced => "Advanced",
        }
    }
}

impl FromStr for ScenarioDifficulty {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "beginner" => Ok(ScenarioDifficulty::Beginner),
            "intermediate" | "medium" => Ok(ScenarioDifficulty::Intermediate),
            "advanced" => Ok(ScenarioDifficulty::Advanced),
            _ => Err(UnknownVariant::new("scenario difficulty", s)),
        }
    }
}

//=========================================================================================
// Catalog Entities
//=========================================================================================

/// A simulated customer personality. Immutable catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub personality: String,
    pub traits: Vec<String>,
    pub difficulty: PersonaDifficulty,
    pub description: String,
}

/// A training scenario that a session is run against.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub id: Uuid,
    pub role: StaffRole,
    pub name: String,
    pub description: String,
    /// Free-text situation narrative handed to both speakers.
    pub situation: String,
    /// Persona id of the simulated customer; also the training-memory key.
    pub customer_type: String,
    pub success_criteria: Vec<String>,
    pub duration_mins: u32,
    pub difficulty: ScenarioDifficulty,
}

//=========================================================================================
// Transcript
//=========================================================================================

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    Customer,
    Staff,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::Customer => "customer",
            Sender::Staff => "staff",
        }
    }
}

impl FromStr for Sender {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Sender::Customer),
            // "user" is how the admin console has always labelled the coach.
            "staff" | "user" => Ok(Sender::Staff),
            other => Err(UnknownVariant::new("sender", other)),
        }
    }
}

/// Why a transcript entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageIntent {
    InitialInquiry,
    CustomerReply,
    ManualCustomer,
    CoachResponse,
    CoachResponseToManual,
    CoachRevision,
    TrainingError,
}

impl MessageIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageIntent::InitialInquiry => "initial_inquiry",
            MessageIntent::CustomerReply => "customer_reply",
            MessageIntent::ManualCustomer => "manual_customer",
            MessageIntent::CoachResponse => "coach_response",
            MessageIntent::CoachResponseToManual => "coach_response_to_manual",
            MessageIntent::CoachRevision => "coach_revision",
            MessageIntent::TrainingError => "training_error",
        }
    }
}

impl FromStr for MessageIntent {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial_inquiry" => Ok(MessageIntent::InitialInquiry),
            "customer_reply" => Ok(MessageIntent::CustomerReply),
            "manual_customer" => Ok(MessageIntent::ManualCustomer),
            "coach_response" => Ok(MessageIntent::CoachResponse),
            "coach_response_to_manual" => Ok(MessageIntent::CoachResponseToManual),
            "coach_revision" => Ok(MessageIntent::CoachRevision),
            "training_error" | "training_error_initial" => Ok(MessageIntent::TrainingError),
            other => Err(UnknownVariant::new("message intent", other)),
        }
    }
}

/// Optional annotations attached to a transcript entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageMetadata {
    pub emotion: Option<String>,
    pub intent: Option<MessageIntent>,
    pub confidence: Option<f32>,
    pub error: bool,
    /// Set on revisions: the staff message this one replaces.
    pub revision_of: Option<Uuid>,
    /// Set on revisions: the trainer feedback that triggered it.
    pub feedback: Option<String>,
}

/// A single transcript entry. Append-only within a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub metadata: MessageMetadata,
}

impl Message {
    pub fn new(session_id: Uuid, sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            sender,
            text: text.into(),
            created_at: Utc::now(),
            metadata: MessageMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_error(&self) -> bool {
        self.metadata.error
    }

    pub fn is_revision(&self) -> bool {
        self.metadata.intent == Some(MessageIntent::CoachRevision)
    }
}

//=========================================================================================
// Sessions and Staff
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Paused,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "paused" => Ok(SessionStatus::Paused),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(UnknownVariant::new("session status", other)),
        }
    }
}

/// One run of a scenario, from start to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSession {
    pub id: Uuid,
    pub scenario_id: Uuid,
    pub staff_id: Option<Uuid>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub customer_persona: String,
    pub transcript: Vec<Message>,
    pub feedback: Vec<String>,
    pub objectives: Vec<String>,
    pub summary: String,
    /// 0-100.
    pub score: Option<u8>,
    pub notes: Option<String>,
}

impl TrainingSession {
    /// Creates a running session for `scenario` with an empty transcript.
    pub fn start(scenario: &Scenario, staff_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            scenario_id: scenario.id,
            staff_id,
            status: SessionStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            customer_persona: scenario.customer_type.clone(),
            transcript: Vec::new(),
            feedback: Vec::new(),
            objectives: scenario.success_criteria.clone(),
            summary: String::new(),
            score: None,
            notes: None,
        }
    }

    pub fn last_from(&self, sender: Sender) -> Option<&Message> {
        self.transcript.iter().rev().find(|m| m.sender == sender)
    }
}

/// A trainable AI staff member. Owns its training memory.
#[derive(Debug, Clone, PartialEq)]
pub struct AiStaff {
    pub id: Uuid,
    pub name: String,
    pub role: StaffRole,
    pub created_at: DateTime<Utc>,
    pub memory: TrainingMemory,
    pub total_sessions: u32,
}

impl AiStaff {
    pub fn new(name: impl Into<String>, role: StaffRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role,
            created_at: Utc::now(),
            memory: TrainingMemory::default(),
            total_sessions: 0,
        }
    }
}

//=========================================================================================
// Grounding Inputs
//=========================================================================================

/// A knowledge-base entry the staff persona is allowed to draw on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeEntry {
    pub id: String,
    pub category: String,
    pub content: String,
    pub topic: Option<String>,
    pub keywords: Vec<String>,
}

/// A trainer-authored rule for how staff should respond.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Guideline {
    pub id: String,
    pub category: String,
    pub title: String,
    pub content: String,
}

impl Guideline {
    /// Only roleplay and general guidelines are handed to the staff persona.
    pub fn applies_to_roleplay(&self) -> bool {
        self.category == "roleplay" || self.category == "general"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_role_round_trips_through_its_wire_name() {
        for role in StaffRole::ALL {
            assert_eq!(role.as_str().parse::<StaffRole>().unwrap(), role);
        }
        assert!("janitor".parse::<StaffRole>().is_err());
    }

    #[test]
    fn legacy_coach_sender_label_is_accepted() {
        assert_eq!("user".parse::<Sender>().unwrap(), Sender::Staff);
    }

    #[test]
    fn last_from_finds_most_recent_message_of_sender() {
        let scenario = Scenario {
            id: Uuid::new_v4(),
            role: StaffRole::Coach,
            name: "Routine Building".into(),
            description: String::new(),
            situation: String::new(),
            customer_type: "confused".into(),
            success_criteria: vec![],
            duration_mins: 15,
            difficulty: ScenarioDifficulty::Beginner,
        };
        let mut session = TrainingSession::start(&scenario, None);
        session.transcript.push(Message::new(session.id, Sender::Customer, "first"));
        session.transcript.push(Message::new(session.id, Sender::Staff, "reply"));
        session.transcript.push(Message::new(session.id, Sender::Customer, "second"));

        assert_eq!(session.last_from(Sender::Customer).unwrap().text, "second");
        assert_eq!(session.last_from(Sender::Staff).unwrap().text, "reply");
    }
}
