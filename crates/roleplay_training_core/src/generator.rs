//! crates/roleplay_training_core/src/generator.rs
//!
//! Produces one transcript entry per call by assembling the prompt for the
//! requested speaker and invoking the matching generation port once.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog;
use crate::domain::{
    Guideline, KnowledgeEntry, Message, MessageIntent, MessageMetadata, Scenario, Sender, StaffRole,
};
use crate::memory::TrainingMemory;
use crate::ports::{
    CustomerSimulationService, CustomerTurnRequest, GenerationError, GenerationResult,
    StaffResponseService, StaffTurnRequest,
};
use crate::prompt::{self, Revision, StaffPromptContext};

/// Prefix of every transcript entry that records a failed generation.
pub const TRAINING_ERROR_PREFIX: &str = "❌ TRAINING ERROR:";

/// Prefix of every staff message produced from trainer feedback.
pub const REVISION_PREFIX: &str = "*[Revised based on feedback]* ";

/// Snapshot of everything a single generation depends on.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub session_id: Uuid,
    pub scenario: Scenario,
    pub staff_name: String,
    pub staff_role: StaffRole,
    pub memory: TrainingMemory,
    /// Applicable lessons, most urgent first.
    pub corrections: Vec<String>,
    pub knowledge_base: Vec<KnowledgeEntry>,
    pub guidelines: Vec<Guideline>,
    pub history: Vec<Message>,
    pub turn: u32,
}

impl TurnContext {
    fn staff_prompt_context(&self) -> StaffPromptContext<'_> {
        StaffPromptContext {
            staff_name: &self.staff_name,
            staff_role: self.staff_role,
            scenario: &self.scenario,
            memory: &self.memory,
            corrections: &self.corrections,
            knowledge_base: &self.knowledge_base,
            guidelines: &self.guidelines,
            history: &self.history,
        }
    }

    fn last_from(&self, sender: Sender) -> Option<&Message> {
        self.history.iter().rev().find(|m| m.sender == sender && !m.is_error())
    }
}

/// Dispatches turn generation to the staff and customer ports.
#[derive(Clone)]
pub struct TurnGenerator {
    staff: Arc<dyn StaffResponseService>,
    customer: Arc<dyn CustomerSimulationService>,
}

impl TurnGenerator {
    pub fn new(
        staff: Arc<dyn StaffResponseService>,
        customer: Arc<dyn CustomerSimulationService>,
    ) -> Self {
        Self { staff, customer }
    }

    /// Generates the next message for `speaker`.
    ///
    /// A customer turn with an empty history opens the conversation. Staff
    /// turns answer the most recent non-error customer message.
    pub async fn generate_turn(&self, speaker: Sender, ctx: &TurnContext) -> GenerationResult<Message> {
        match speaker {
            Sender::Customer if ctx.history.is_empty() => self.opening(ctx).await,
            Sender::Customer => self.customer_reply(ctx).await,
            Sender::Staff => self.staff_reply(ctx).await,
        }
    }

    async fn opening(&self, ctx: &TurnContext) -> GenerationResult<Message> {
        let persona = prompt::persona_for(&ctx.scenario);
        let prompt = prompt::opening_prompt(&ctx.scenario, persona.as_ref());
        debug!(session_id = %ctx.session_id, "Generating opening customer message");

        let text = non_empty(self.customer.open_conversation(&prompt).await?)?;
        Ok(customer_message(ctx, text, MessageIntent::InitialInquiry))
    }

    async fn customer_reply(&self, ctx: &TurnContext) -> GenerationResult<Message> {
        let staff_message = ctx
            .last_from(Sender::Staff)
            .map(|m| m.text.clone())
            .unwrap_or_default();
        let request = CustomerTurnRequest {
            prompt: prompt::customer_prompt(&ctx.scenario, &staff_message, &ctx.history, ctx.turn),
            scenario: ctx.scenario.clone(),
            staff_message,
            history: ctx.history.clone(),
            turn: ctx.turn,
        };
        debug!(session_id = %ctx.session_id, turn = ctx.turn, "Generating customer reply");

        let text = non_empty(self.customer.react(&request).await?)?;
        Ok(customer_message(ctx, text, MessageIntent::CustomerReply))
    }

    async fn staff_reply(&self, ctx: &TurnContext) -> GenerationResult<Message> {
        let last_customer = ctx.last_from(Sender::Customer);
        let intent = match last_customer.and_then(|m| m.metadata.intent) {
            Some(MessageIntent::ManualCustomer) => MessageIntent::CoachResponseToManual,
            _ => MessageIntent::CoachResponse,
        };
        let request = self.staff_request(
            ctx,
            prompt::staff_prompt(&ctx.staff_prompt_context()),
            last_customer.map(|m| m.text.clone()).unwrap_or_default(),
        );
        debug!(session_id = %ctx.session_id, turn = ctx.turn, "Generating staff reply");

        let text = non_empty(self.staff.respond(&request).await?)?;
        let metadata = MessageMetadata {
            intent: Some(intent),
            ..Default::default()
        };
        Ok(Message::new(ctx.session_id, Sender::Staff, text).with_metadata(metadata))
    }

    /// Re-generates `previous` with the trainer's feedback applied.
    ///
    /// `ctx.corrections` should already carry the feedback at its head.
    pub async fn revise(
        &self,
        ctx: &TurnContext,
        previous: &Message,
        feedback: &str,
    ) -> GenerationResult<Message> {
        let customer_question = ctx
            .history
            .iter()
            .take_while(|m| m.id != previous.id)
            .filter(|m| m.sender == Sender::Customer && !m.is_error())
            .last()
            .map(|m| m.text.clone())
            .unwrap_or_default();
        let revision = Revision {
            customer_question: &customer_question,
            previous_response: &previous.text,
            feedback,
        };
        let request = self.staff_request(
            ctx,
            prompt::revision_prompt(&ctx.staff_prompt_context(), &revision),
            customer_question.clone(),
        );
        debug!(session_id = %ctx.session_id, revision_of = %previous.id, "Generating staff revision");

        let text = non_empty(self.staff.respond(&request).await?)?;
        let metadata = MessageMetadata {
            intent: Some(MessageIntent::CoachRevision),
            revision_of: Some(previous.id),
            feedback: Some(feedback.to_string()),
            ..Default::default()
        };
        Ok(
            Message::new(ctx.session_id, Sender::Staff, format!("{REVISION_PREFIX}{text}"))
                .with_metadata(metadata),
        )
    }

    fn staff_request(&self, ctx: &TurnContext, prompt: String, customer_message: String) -> StaffTurnRequest {
        StaffTurnRequest {
            prompt,
            customer_message,
            history: ctx.history.clone(),
            customer_persona: ctx.scenario.customer_type.clone(),
            scenario_description: ctx.scenario.situation.clone(),
            knowledge_base: ctx.knowledge_base.clone(),
            guidelines: ctx.guidelines.clone(),
        }
    }
}

fn customer_message(ctx: &TurnContext, text: String, intent: MessageIntent) -> Message {
    let metadata = MessageMetadata {
        emotion: Some(catalog::persona_emotion(&ctx.scenario.customer_type).to_string()),
        intent: Some(intent),
        ..Default::default()
    };
    Message::new(ctx.session_id, Sender::Customer, text).with_metadata(metadata)
}

fn non_empty(text: String) -> GenerationResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::Malformed("empty response".into()));
    }
    Ok(trimmed.to_string())
}

/// The visible transcript entry recording a failed generation for `speaker`.
pub fn error_message(session_id: Uuid, speaker: Sender, err: &GenerationError) -> Message {
    warn!(%session_id, speaker = speaker.as_str(), error = %err, "Generation failed");
    let metadata = MessageMetadata {
        intent: Some(MessageIntent::TrainingError),
        error: true,
        ..Default::default()
    };
    Message::new(session_id, speaker, format!("{TRAINING_ERROR_PREFIX} {err}")).with_metadata(metadata)
}
