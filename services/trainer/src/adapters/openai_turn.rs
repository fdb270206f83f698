//! services/trainer/src/adapters/openai_turn.rs
//!
//! Generation adapter that calls a chat-completion model directly. The
//! assembled prompt becomes the system message; the latest utterance of the
//! other party becomes the user message.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use roleplay_training_core::ports::{
    CustomerSimulationService, CustomerTurnRequest, GenerationError, GenerationResult,
    StaffResponseService, StaffTurnRequest,
};
use roleplay_training_core::prompt::select_knowledge;
use tracing::debug;

const STAFF_MAX_TOKENS: u32 = 500;
const CUSTOMER_MAX_TOKENS: u32 = 200;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements both generation ports using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiTurnAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTurnAdapter {
    /// Creates a new `OpenAiTurnAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    async fn complete(
        &self,
        system: String,
        user: String,
        max_tokens: u32,
        temperature: f32,
    ) -> GenerationResult<String> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(|e| GenerationError::Malformed(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user)
                    .build()
                    .map_err(|e| GenerationError::Malformed(e.to_string()))?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(max_tokens)
            .temperature(temperature)
            .build()
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        debug!(model = %self.model, "Calling chat completion");
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Malformed("completion contained no text".to_string()))
    }
}

fn map_openai_error(err: OpenAIError) -> GenerationError {
    match err {
        OpenAIError::Reqwest(e) => GenerationError::Transport(e.to_string()),
        OpenAIError::ApiError(e) => GenerationError::Rejected(e.message),
        other => GenerationError::Transport(other.to_string()),
    }
}

/// Appends the knowledge entries relevant to the customer's message.
fn staff_system_prompt(request: &StaffTurnRequest) -> String {
    let relevant = select_knowledge(&request.knowledge_base, &request.customer_message);
    if relevant.is_empty() {
        return request.prompt.clone();
    }
    let focus = relevant
        .iter()
        .map(|entry| format!("- {}", entry.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{}\n\nMOST RELEVANT KNOWLEDGE FOR THIS MESSAGE:\n{}",
        request.prompt, focus
    )
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl StaffResponseService for OpenAiTurnAdapter {
    async fn respond(&self, request: &StaffTurnRequest) -> GenerationResult<String> {
        self.complete(
            staff_system_prompt(request),
            format!("Customer: {}", request.customer_message),
            STAFF_MAX_TOKENS,
            0.7,
        )
        .await
    }
}

#[async_trait]
impl CustomerSimulationService for OpenAiTurnAdapter {
    async fn open_conversation(&self, prompt: &str) -> GenerationResult<String> {
        self.complete(
            prompt.to_string(),
            "Start the conversation now.".to_string(),
            CUSTOMER_MAX_TOKENS,
            0.9,
        )
        .await
    }

    async fn react(&self, request: &CustomerTurnRequest) -> GenerationResult<String> {
        self.complete(
            request.prompt.clone(),
            format!("Staff: {}", request.staff_message),
            CUSTOMER_MAX_TOKENS,
            0.8,
        )
        .await
    }
}
