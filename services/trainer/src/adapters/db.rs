//! services/trainer/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `TrainingStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roleplay_training_core::domain::{
    AiStaff, Message, MessageMetadata, Scenario, TrainingSession,
};
use roleplay_training_core::memory::TrainingMemory;
use roleplay_training_core::ports::{PortError, PortResult, TrainingStore};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `TrainingStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn invalid<E: std::fmt::Display>(e: E) -> PortError {
    PortError::InvalidRecord(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct StaffRecord {
    id: Uuid,
    name: String,
    role: String,
    created_at: DateTime<Utc>,
    memory: Json<BTreeMap<String, Vec<String>>>,
    total_sessions: i32,
}
impl StaffRecord {
    fn to_domain(self) -> PortResult<AiStaff> {
        Ok(AiStaff {
            id: self.id,
            name: self.name,
            role: self.role.parse().map_err(invalid)?,
            created_at: self.created_at,
            memory: TrainingMemory::from_entries(self.memory.0),
            total_sessions: self.total_sessions.max(0) as u32,
        })
    }
}

#[derive(FromRow)]
struct ScenarioRecord {
    id: Uuid,
    role: String,
    name: String,
    description: String,
    situation: String,
    customer_type: String,
    success_criteria: Json<Vec<String>>,
    duration_mins: i32,
    difficulty: String,
}
impl ScenarioRecord {
    fn to_domain(self) -> PortResult<Scenario> {
        Ok(Scenario {
            id: self.id,
            role: self.role.parse().map_err(invalid)?,
            name: self.name,
            description: self.description,
            situation: self.situation,
            customer_type: self.customer_type,
            success_criteria: self.success_criteria.0,
            duration_mins: self.duration_mins.max(0) as u32,
            difficulty: self.difficulty.parse().map_err(invalid)?,
        })
    }
}

/// A transcript entry as stored inside the `transcript` JSONB column.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct MessageRecord {
    id: Uuid,
    sender: String,
    text: String,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence: Option<f32>,
    #[serde(default)]
    error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    revision_of: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    feedback: Option<String>,
}
impl MessageRecord {
    pub(crate) fn from_domain(message: &Message) -> Self {
        Self {
            id: message.id,
            sender: message.sender.as_str().to_string(),
            text: message.text.clone(),
            created_at: message.created_at,
            emotion: message.metadata.emotion.clone(),
            intent: message.metadata.intent.map(|i| i.as_str().to_string()),
            confidence: message.metadata.confidence,
            error: message.metadata.error,
            revision_of: message.metadata.revision_of,
            feedback: message.metadata.feedback.clone(),
        }
    }

    pub(crate) fn to_domain(self, session_id: Uuid) -> PortResult<Message> {
        let intent = match self.intent {
            Some(raw) => Some(raw.parse().map_err(invalid)?),
            None => None,
        };
        Ok(Message {
            id: self.id,
            session_id,
            sender: self.sender.parse().map_err(invalid)?,
            text: self.text,
            created_at: self.created_at,
            metadata: MessageMetadata {
                emotion: self.emotion,
                intent,
                confidence: self.confidence,
                error: self.error,
                revision_of: self.revision_of,
                feedback: self.feedback,
            },
        })
    }
}

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    scenario_id: Uuid,
    staff_id: Option<Uuid>,
    status: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    customer_persona: String,
    transcript: Json<Vec<MessageRecord>>,
    feedback: Json<Vec<String>>,
    objectives: Json<Vec<String>>,
    summary: String,
    score: Option<i16>,
    notes: Option<String>,
}
impl SessionRecord {
    fn to_domain(self) -> PortResult<TrainingSession> {
        let id = self.id;
        let transcript = self
            .transcript
            .0
            .into_iter()
            .map(|m| m.to_domain(id))
            .collect::<PortResult<Vec<_>>>()?;
        Ok(TrainingSession {
            id,
            scenario_id: self.scenario_id,
            staff_id: self.staff_id,
            status: self.status.parse().map_err(invalid)?,
            started_at: self.started_at,
            ended_at: self.ended_at,
            customer_persona: self.customer_persona,
            transcript,
            feedback: self.feedback.0,
            objectives: self.objectives.0,
            summary: self.summary,
            score: self.score.map(|s| s.clamp(0, 100) as u8),
            notes: self.notes,
        })
    }
}

const STAFF_COLUMNS: &str = "id, name, role, created_at, memory, total_sessions";
const SCENARIO_COLUMNS: &str =
    "id, role, name, description, situation, customer_type, success_criteria, duration_mins, difficulty";
const SESSION_COLUMNS: &str = "id, scenario_id, staff_id, status, started_at, ended_at, customer_persona, \
     transcript, feedback, objectives, summary, score, notes";

//=========================================================================================
// `TrainingStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl TrainingStore for DbAdapter {
    async fn load_ai_staff(&self) -> PortResult<Vec<AiStaff>> {
        let records = sqlx::query_as::<_, StaffRecord>(&format!(
            "SELECT {STAFF_COLUMNS} FROM ai_staff ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(StaffRecord::to_domain).collect()
    }

    async fn save_ai_staff(&self, staff: &AiStaff) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO ai_staff (id, name, role, created_at, memory, total_sessions) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, role = EXCLUDED.role, \
             memory = EXCLUDED.memory, total_sessions = EXCLUDED.total_sessions",
        )
        .bind(staff.id)
        .bind(&staff.name)
        .bind(staff.role.as_str())
        .bind(staff.created_at)
        .bind(Json(staff.memory.as_map()))
        .bind(staff.total_sessions as i32)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn delete_ai_staff(&self, staff_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM ai_staff WHERE id = $1")
            .bind(staff_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("AI staff {} not found", staff_id)));
        }
        Ok(())
    }

    async fn load_scenarios(&self) -> PortResult<Vec<Scenario>> {
        let records = sqlx::query_as::<_, ScenarioRecord>(&format!(
            "SELECT {SCENARIO_COLUMNS} FROM training_scenarios ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(ScenarioRecord::to_domain).collect()
    }

    async fn save_scenario(&self, scenario: &Scenario) -> PortResult<Scenario> {
        let record = sqlx::query_as::<_, ScenarioRecord>(&format!(
            "INSERT INTO training_scenarios ({SCENARIO_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET role = EXCLUDED.role, name = EXCLUDED.name, \
             description = EXCLUDED.description, situation = EXCLUDED.situation, \
             customer_type = EXCLUDED.customer_type, success_criteria = EXCLUDED.success_criteria, \
             duration_mins = EXCLUDED.duration_mins, difficulty = EXCLUDED.difficulty \
             RETURNING {SCENARIO_COLUMNS}"
        ))
        .bind(scenario.id)
        .bind(scenario.role.as_str())
        .bind(&scenario.name)
        .bind(&scenario.description)
        .bind(&scenario.situation)
        .bind(&scenario.customer_type)
        .bind(Json(&scenario.success_criteria))
        .bind(scenario.duration_mins as i32)
        .bind(scenario.difficulty.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        record.to_domain()
    }

    async fn delete_scenario(&self, scenario_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM training_scenarios WHERE id = $1")
            .bind(scenario_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Scenario {} not found", scenario_id)));
        }
        Ok(())
    }

    async fn load_sessions(&self) -> PortResult<Vec<TrainingSession>> {
        let records = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM training_sessions ORDER BY started_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(SessionRecord::to_domain).collect()
    }

    async fn save_session(&self, session: &TrainingSession) -> PortResult<()> {
        let transcript: Vec<MessageRecord> = session.transcript.iter().map(MessageRecord::from_domain).collect();
        sqlx::query(&format!(
            "INSERT INTO training_sessions ({SESSION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, ended_at = EXCLUDED.ended_at, \
             transcript = EXCLUDED.transcript, feedback = EXCLUDED.feedback, \
             summary = EXCLUDED.summary, score = EXCLUDED.score, notes = EXCLUDED.notes"
        ))
        .bind(session.id)
        .bind(session.scenario_id)
        .bind(session.staff_id)
        .bind(session.status.as_str())
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(&session.customer_persona)
        .bind(Json(transcript))
        .bind(Json(&session.feedback))
        .bind(Json(&session.objectives))
        .bind(&session.summary)
        .bind(session.score.map(i16::from))
        .bind(&session.notes)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn delete_session(&self, session_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM training_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Session {} not found", session_id)));
        }
        Ok(())
    }
}
