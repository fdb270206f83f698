//! services/trainer/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the admin console and the
//! trainer, plus the JSON shapes shared with the REST API.

use chrono::{DateTime, Utc};
use roleplay_training_core::catalog::ScenarioTemplate;
use roleplay_training_core::domain::{
    AiStaff, Guideline, KnowledgeEntry, Message, Persona, Scenario, TrainingSession,
};
use roleplay_training_core::{DriverEvent, DriverSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Selects the staff member and grounding. This must be the first message sent on the connection.
    Init {
        #[serde(default)]
        staff_id: Option<Uuid>,
        #[serde(default)]
        knowledge_base: Vec<KnowledgeDto>,
        #[serde(default)]
        guidelines: Vec<GuidelineDto>,
    },

    /// Starts a new session for a stored scenario and begins auto stepping.
    Start { scenario_id: Uuid },

    /// Switches between trainer-typed and generated customer messages.
    SetManual { enabled: bool },

    /// Customer text typed by the trainer while in manual mode.
    ManualMessage { text: String },

    /// Trainer feedback on the latest staff reply.
    Feedback { text: String },

    /// Keeps feedback as a roleplay guideline for the rest of the connection.
    /// A missing title defaults to the scenario name.
    SaveGuideline {
        #[serde(default)]
        title: Option<String>,
        text: String,
    },

    Pause,

    Resume,

    /// Ends the session; missing values are computed.
    Complete {
        #[serde(default)]
        score: Option<u8>,
        #[serde(default)]
        summary: Option<String>,
    },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms successful initialization.
    Initialized { staff: Option<StaffDto> },

    SessionStarted { session: SessionDto },

    MessageAppended { message: MessageDto },

    StateChanged {
        state: &'static str,
        manual: bool,
        turn: u32,
        session_id: Option<Uuid>,
    },

    SessionCompleted { session: SessionDto },

    GuidelineSaved { guideline: GuidelineDto },

    /// Reports an error to the client, which should display an error message.
    Error { message: String },
}

impl From<&DriverSnapshot> for ServerMessage {
    fn from(snapshot: &DriverSnapshot) -> Self {
        ServerMessage::StateChanged {
            state: snapshot.state.as_str(),
            manual: snapshot.manual,
            turn: snapshot.turn,
            session_id: snapshot.session_id,
        }
    }
}

impl From<DriverEvent> for ServerMessage {
    fn from(event: DriverEvent) -> Self {
        match event {
            DriverEvent::SessionStarted(session) => ServerMessage::SessionStarted {
                session: SessionDto::from(&session),
            },
            DriverEvent::MessageAppended(message) => ServerMessage::MessageAppended {
                message: MessageDto::from(&message),
            },
            DriverEvent::StateChanged(snapshot) => ServerMessage::from(&snapshot),
            DriverEvent::SessionCompleted(session) => ServerMessage::SessionCompleted {
                session: SessionDto::from(&session),
            },
            DriverEvent::GuidelineSaved(guideline) => ServerMessage::GuidelineSaved {
                guideline: GuidelineDto::from(&guideline),
            },
        }
    }
}

//=========================================================================================
// Shared JSON Shapes
//=========================================================================================

#[derive(Serialize, Deserialize, Debug, Clone, Default, ToSchema)]
pub struct KnowledgeDto {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl From<KnowledgeDto> for KnowledgeEntry {
    fn from(dto: KnowledgeDto) -> Self {
        KnowledgeEntry {
            id: dto.id,
            category: dto.category,
            content: dto.content,
            topic: dto.topic,
            keywords: dto.keywords,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, ToSchema)]
pub struct GuidelineDto {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
}

impl From<GuidelineDto> for Guideline {
    fn from(dto: GuidelineDto) -> Self {
        Guideline {
            id: dto.id,
            category: dto.category,
            title: dto.title,
            content: dto.content,
        }
    }
}

impl From<&Guideline> for GuidelineDto {
    fn from(g: &Guideline) -> Self {
        Self {
            id: g.id.clone(),
            category: g.category.clone(),
            title: g.title.clone(),
            content: g.content.clone(),
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct PersonaDto {
    pub id: String,
    pub name: String,
    pub personality: String,
    pub traits: Vec<String>,
    pub difficulty: &'static str,
    pub description: String,
}

impl From<Persona> for PersonaDto {
    fn from(p: Persona) -> Self {
        Self {
            id: p.id,
            name: p.name,
            personality: p.personality,
            traits: p.traits,
            difficulty: p.difficulty.as_str(),
            description: p.description,
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct TemplateDto {
    pub name: &'static str,
    pub description: &'static str,
    pub situation: &'static str,
    pub success_criteria: Vec<&'static str>,
    pub customer_type: Option<&'static str>,
    pub difficulty: Option<&'static str>,
    pub duration_mins: u32,
}

impl From<&ScenarioTemplate> for TemplateDto {
    fn from(t: &ScenarioTemplate) -> Self {
        Self {
            name: t.name,
            description: t.description,
            situation: t.situation,
            success_criteria: t.criteria.to_vec(),
            customer_type: t.customer_type,
            difficulty: t.difficulty.map(|d| d.as_str()),
            duration_mins: t.duration_mins,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct ScenarioDto {
    pub id: Uuid,
    pub role: &'static str,
    pub name: String,
    pub description: String,
    pub situation: String,
    pub customer_type: String,
    pub success_criteria: Vec<String>,
    pub duration_mins: u32,
    pub difficulty: &'static str,
}

impl From<&Scenario> for ScenarioDto {
    fn from(s: &Scenario) -> Self {
        Self {
            id: s.id,
            role: s.role.as_str(),
            name: s.name.clone(),
            description: s.description.clone(),
            situation: s.situation.clone(),
            customer_type: s.customer_type.clone(),
            success_criteria: s.success_criteria.clone(),
            duration_mins: s.duration_mins,
            difficulty: s.difficulty.as_str(),
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct StaffDto {
    pub id: Uuid,
    pub name: String,
    pub role: &'static str,
    pub created_at: DateTime<Utc>,
    pub memory: BTreeMap<String, Vec<String>>,
    pub total_sessions: u32,
}

impl From<&AiStaff> for StaffDto {
    fn from(s: &AiStaff) -> Self {
        Self {
            id: s.id,
            name: s.name.clone(),
            role: s.role.as_str(),
            created_at: s.created_at,
            memory: s.memory.as_map().clone(),
            total_sessions: s.total_sessions,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct MessageDto {
    pub id: Uuid,
    pub sender: &'static str,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub emotion: Option<String>,
    pub intent: Option<&'static str>,
    pub confidence: Option<f32>,
    pub error: bool,
    pub revision_of: Option<Uuid>,
    pub feedback: Option<String>,
}

impl From<&Message> for MessageDto {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id,
            sender: m.sender.as_str(),
            text: m.text.clone(),
            created_at: m.created_at,
            emotion: m.metadata.emotion.clone(),
            intent: m.metadata.intent.map(|i| i.as_str()),
            confidence: m.metadata.confidence,
            error: m.metadata.error,
            revision_of: m.metadata.revision_of,
            feedback: m.metadata.feedback.clone(),
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct SessionDto {
    pub id: Uuid,
    pub scenario_id: Uuid,
    pub staff_id: Option<Uuid>,
    pub status: &'static str,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub customer_persona: String,
    pub transcript: Vec<MessageDto>,
    pub feedback: Vec<String>,
    pub objectives: Vec<String>,
    pub summary: String,
    pub score: Option<u8>,
    pub notes: Option<String>,
}

impl From<&TrainingSession> for SessionDto {
    fn from(s: &TrainingSession) -> Self {
        Self {
            id: s.id,
            scenario_id: s.scenario_id,
            staff_id: s.staff_id,
            status: s.status.as_str(),
            started_at: s.started_at,
            ended_at: s.ended_at,
            customer_persona: s.customer_persona.clone(),
            transcript: s.transcript.iter().map(MessageDto::from).collect(),
            feedback: s.feedback.clone(),
            objectives: s.objectives.clone(),
            summary: s.summary.clone(),
            score: s.score,
            notes: s.notes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roleplay_training_core::domain::Sender;
    use roleplay_training_core::DriverState;
    use serde_json::json;

    #[test]
    fn client_messages_use_snake_case_tags() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "init",
            "knowledge_base": [{"content": "Ships in 2 days", "keywords": ["shipping"]}]
        }))
        .unwrap();
        match msg {
            ClientMessage::Init {
                staff_id,
                knowledge_base,
                guidelines,
            } => {
                assert!(staff_id.is_none());
                assert_eq!(knowledge_base[0].keywords, vec!["shipping".to_string()]);
                assert!(guidelines.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }

        let manual: ClientMessage =
            serde_json::from_value(json!({"type": "manual_message", "text": "hi"})).unwrap();
        assert!(matches!(manual, ClientMessage::ManualMessage { text } if text == "hi"));

        let save: ClientMessage =
            serde_json::from_value(json!({"type": "save_guideline", "text": "Apologise first"})).unwrap();
        assert!(matches!(save, ClientMessage::SaveGuideline { title: None, text } if text == "Apologise first"));

        let complete: ClientMessage = serde_json::from_value(json!({"type": "complete"})).unwrap();
        assert!(matches!(complete, ClientMessage::Complete { score: None, summary: None }));
    }

    #[test]
    fn driver_events_become_tagged_server_messages() {
        let snapshot = DriverSnapshot {
            state: DriverState::Paused,
            manual: true,
            turn: 3,
            session_id: None,
        };
        let value = serde_json::to_value(ServerMessage::from(DriverEvent::StateChanged(snapshot))).unwrap();
        assert_eq!(value["type"], "state_changed");
        assert_eq!(value["state"], "paused");
        assert_eq!(value["turn"], 3);

        let message = Message::new(Uuid::new_v4(), Sender::Customer, "Hello");
        let value = serde_json::to_value(ServerMessage::from(DriverEvent::MessageAppended(message))).unwrap();
        assert_eq!(value["type"], "message_appended");
        assert_eq!(value["message"]["sender"], "customer");

        let guideline = Guideline {
            id: "g1".into(),
            category: "roleplay".into(),
            title: "Roleplay Training: Product Complaint".into(),
            content: "Apologise first".into(),
        };
        let value = serde_json::to_value(ServerMessage::from(DriverEvent::GuidelineSaved(guideline))).unwrap();
        assert_eq!(value["type"], "guideline_saved");
        assert_eq!(value["guideline"]["category"], "roleplay");
    }
}
