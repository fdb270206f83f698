//! services/trainer/src/adapters/http_turn.rs
//!
//! Generation adapter for the admin console's chat endpoints. Implements both
//! the `StaffResponseService` and `CustomerSimulationService` ports over plain
//! JSON POSTs.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use roleplay_training_core::domain::{Guideline, KnowledgeEntry, Message, Sender};
use roleplay_training_core::ports::{
    CustomerSimulationService, CustomerTurnRequest, GenerationError, GenerationResult,
    StaffResponseService, StaffTurnRequest,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Context string the chat endpoint expects for opening messages.
const OPENING_CONTEXT: &str = "roleplay-initial-message";

//=========================================================================================
// Wire Payloads
//=========================================================================================

#[derive(Serialize, Debug, PartialEq)]
pub(crate) struct HistoryItem {
    sender: &'static str,
    message: String,
    timestamp: DateTime<Utc>,
}

impl From<&Message> for HistoryItem {
    fn from(message: &Message) -> Self {
        Self {
            // The endpoints call the coach "user".
            sender: match message.sender {
                Sender::Staff => "user",
                Sender::Customer => "customer",
            },
            message: message.text.clone(),
            timestamp: message.created_at,
        }
    }
}

#[derive(Serialize, Debug)]
struct KnowledgeItem<'a> {
    id: &'a str,
    category: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
    keywords: &'a [String],
}

impl<'a> From<&'a KnowledgeEntry> for KnowledgeItem<'a> {
    fn from(entry: &'a KnowledgeEntry) -> Self {
        Self {
            id: &entry.id,
            category: &entry.category,
            content: &entry.content,
            topic: entry.topic.as_deref(),
            keywords: &entry.keywords,
        }
    }
}

#[derive(Serialize, Debug)]
struct GuidelineItem<'a> {
    id: &'a str,
    category: &'a str,
    title: &'a str,
    content: &'a str,
}

impl<'a> From<&'a Guideline> for GuidelineItem<'a> {
    fn from(g: &'a Guideline) -> Self {
        Self {
            id: &g.id,
            category: &g.category,
            title: &g.title,
            content: &g.content,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct StaffPayload<'a> {
    prompt: &'a str,
    customer_message: &'a str,
    conversation_history: Vec<HistoryItem>,
    customer_persona: &'a str,
    scenario: &'a str,
    knowledge_base: Vec<KnowledgeItem<'a>>,
    guidelines: Vec<GuidelineItem<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ScenarioItem<'a> {
    name: &'a str,
    description: &'a str,
    customer_type: &'a str,
    objectives: &'a [String],
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CustomerPayload<'a> {
    scenario: ScenarioItem<'a>,
    coach_message: &'a str,
    conversation_history: Vec<HistoryItem>,
    turn: u32,
}

#[derive(Serialize, Debug)]
struct OpeningPayload<'a> {
    message: &'a str,
    context: &'static str,
}

/// The reply shape shared by all three endpoints.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct EndpointReply {
    success: Option<bool>,
    response: Option<String>,
    error: Option<String>,
}

impl EndpointReply {
    /// `success: false` or a missing response is a failure; the opening
    /// endpoint omits `success` entirely.
    pub(crate) fn into_text(self) -> GenerationResult<String> {
        if self.success == Some(false) {
            return Err(GenerationError::Rejected(
                self.error.unwrap_or_else(|| "success=false".to_string()),
            ));
        }
        self.response
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| GenerationError::Malformed("response field is missing".to_string()))
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Calls the staff, customer and opening endpoints over HTTP.
#[derive(Clone)]
pub struct HttpTurnAdapter {
    client: Client,
    staff_url: String,
    customer_url: String,
    opening_url: String,
}

impl HttpTurnAdapter {
    pub fn new(
        staff_url: String,
        customer_url: String,
        opening_url: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            staff_url,
            customer_url,
            opening_url,
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> GenerationResult<String> {
        debug!(url, "Calling generation endpoint");
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(url, status = status.as_u16(), "Generation endpoint returned an error status");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: EndpointReply = resp
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        reply.into_text()
    }
}

fn history(messages: &[Message]) -> Vec<HistoryItem> {
    // Failed turns are visible to the trainer but never fed back to a model.
    messages.iter().filter(|m| !m.is_error()).map(HistoryItem::from).collect()
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl StaffResponseService for HttpTurnAdapter {
    async fn respond(&self, request: &StaffTurnRequest) -> GenerationResult<String> {
        let payload = StaffPayload {
            prompt: &request.prompt,
            customer_message: &request.customer_message,
            conversation_history: history(&request.history),
            customer_persona: &request.customer_persona,
            scenario: &request.scenario_description,
            knowledge_base: request.knowledge_base.iter().map(KnowledgeItem::from).collect(),
            guidelines: request.guidelines.iter().map(GuidelineItem::from).collect(),
        };
        self.post(&self.staff_url, &payload).await
    }
}

#[async_trait]
impl CustomerSimulationService for HttpTurnAdapter {
    async fn open_conversation(&self, prompt: &str) -> GenerationResult<String> {
        let payload = OpeningPayload {
            message: prompt,
            context: OPENING_CONTEXT,
        };
        self.post(&self.opening_url, &payload).await
    }

    async fn react(&self, request: &CustomerTurnRequest) -> GenerationResult<String> {
        let payload = CustomerPayload {
            scenario: ScenarioItem {
                name: &request.scenario.name,
                description: &request.scenario.situation,
                customer_type: &request.scenario.customer_type,
                objectives: &request.scenario.success_criteria,
            },
            coach_message: &request.staff_message,
            conversation_history: history(&request.history),
            turn: request.turn,
        };
        self.post(&self.customer_url, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn staff_history_uses_the_user_label() {
        let session_id = Uuid::new_v4();
        let staff = Message::new(session_id, Sender::Staff, "How can I help?");
        let value = serde_json::to_value(HistoryItem::from(&staff)).unwrap();
        assert_eq!(value["sender"], "user");
        assert_eq!(value["message"], "How can I help?");
    }

    #[test]
    fn history_skips_error_entries() {
        let session_id = Uuid::new_v4();
        let mut failed = Message::new(session_id, Sender::Staff, "❌ TRAINING ERROR: API error: 500");
        failed.metadata.error = true;
        let messages = vec![Message::new(session_id, Sender::Customer, "Hello"), failed];
        assert_eq!(history(&messages).len(), 1);
    }

    #[test]
    fn customer_payload_uses_camel_case_keys() {
        let payload = CustomerPayload {
            scenario: ScenarioItem {
                name: "Delayed Shipment",
                description: "Order is late",
                customer_type: "angry",
                objectives: &[],
            },
            coach_message: "Sorry about that",
            conversation_history: vec![],
            turn: 2,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["coachMessage"], "Sorry about that");
        assert_eq!(value["scenario"]["customerType"], "angry");
        assert_eq!(value["turn"], 2);
    }

    #[test]
    fn replies_are_validated() {
        let ok: EndpointReply = serde_json::from_value(json!({"success": true, "response": "Hi"})).unwrap();
        assert_eq!(ok.into_text().unwrap(), "Hi");

        let opening: EndpointReply = serde_json::from_value(json!({"response": "I need help"})).unwrap();
        assert_eq!(opening.into_text().unwrap(), "I need help");

        let rejected: EndpointReply =
            serde_json::from_value(json!({"success": false, "error": "quota exceeded"})).unwrap();
        assert_eq!(
            rejected.into_text(),
            Err(GenerationError::Rejected("quota exceeded".into()))
        );

        let empty: EndpointReply = serde_json::from_value(json!({"success": true})).unwrap();
        assert!(matches!(empty.into_text(), Err(GenerationError::Malformed(_))));
    }
}
