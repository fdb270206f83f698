//! crates/roleplay_training_core/src/driver.rs
//!
//! The dialogue state machine. One `TrainingDriver` runs one session at a time
//! for the selected AI staff member and is shared (behind an `Arc`) between the
//! task stepping the conversation and whoever issues trainer commands.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{
    AiStaff, Guideline, KnowledgeEntry, Message, MessageIntent, MessageMetadata, Scenario, Sender,
    SessionStatus, TrainingSession,
};
use crate::generator::{self, TurnContext, TurnGenerator};
use crate::memory::TrainingMemory;
use crate::ports::{PortError, TrainingStore};
use crate::prompt;
use crate::recorder;

/// Name used in prompts when no staff member has been selected.
pub const DEFAULT_STAFF_NAME: &str = "AI Staff";

/// Emotion tag for customer messages typed by the trainer.
pub const MANUAL_CUSTOMER_EMOTION: &str = "👤";

const ORIGINAL_RESPONSE_EXCERPT: usize = 100;

#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Auto steps allowed before the session is completed.
    pub max_turns: u32,
    /// Pause between the customer's message and the staff reply.
    pub settle_delay: Duration,
    /// Pause between consecutive auto steps.
    pub step_delay: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            max_turns: 8,
            settle_delay: Duration::from_millis(1500),
            step_delay: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("No training session is active")]
    NoActiveSession,
    #[error("The training session is already completed")]
    SessionCompleted,
    #[error("The training session is paused")]
    Paused,
    #[error("The training session is not paused")]
    NotPaused,
    #[error("Manual mode is not enabled")]
    NotInManualMode,
    #[error("A training session is in progress")]
    SessionInProgress,
    #[error("There is no staff message to revise")]
    NothingToRevise,
    #[error("Text must not be empty")]
    EmptyText,
    #[error("Unknown AI staff: {0}")]
    UnknownStaff(Uuid),
    #[error("Store error: {0}")]
    Store(#[from] PortError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
    Paused,
    Completed,
}

impl DriverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverState::Idle => "idle",
            DriverState::Running => "running",
            DriverState::Paused => "paused",
            DriverState::Completed => "completed",
        }
    }
}

/// What a single auto step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// One exchange was produced.
    Advanced,
    /// The turn cap was reached and the session was completed.
    Completed,
    /// The driver is paused, in manual mode, or the step was cancelled.
    Stopped,
}

/// Notifications published to subscribers as the session evolves.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    SessionStarted(TrainingSession),
    MessageAppended(Message),
    StateChanged(DriverSnapshot),
    SessionCompleted(TrainingSession),
    GuidelineSaved(Guideline),
}

/// A point-in-time view of the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverSnapshot {
    pub state: DriverState,
    pub manual: bool,
    pub turn: u32,
    pub session_id: Option<Uuid>,
}

struct DriverInner {
    session: Option<TrainingSession>,
    scenario: Option<Scenario>,
    staff: Option<AiStaff>,
    /// Working memory; mirrors the selected staff member's memory.
    memory: TrainingMemory,
    knowledge_base: Vec<KnowledgeEntry>,
    guidelines: Vec<Guideline>,
    turn: u32,
    manual: bool,
    /// Cancelled by pause and manual mode; checked before auto appends.
    cancel: CancellationToken,
}

impl DriverInner {
    fn state(&self) -> DriverState {
        match self.session.as_ref().map(|s| s.status) {
            None => DriverState::Idle,
            Some(SessionStatus::Running) => DriverState::Running,
            Some(SessionStatus::Paused) => DriverState::Paused,
            Some(SessionStatus::Completed) => DriverState::Completed,
        }
    }

    fn snapshot(&self) -> DriverSnapshot {
        DriverSnapshot {
            state: self.state(),
            manual: self.manual,
            turn: self.turn,
            session_id: self.session.as_ref().map(|s| s.id),
        }
    }

    /// Fails unless a session exists and has not been completed.
    fn open_session(&self) -> Result<&TrainingSession, DriverError> {
        let session = self.session.as_ref().ok_or(DriverError::NoActiveSession)?;
        if session.status == SessionStatus::Completed {
            return Err(DriverError::SessionCompleted);
        }
        Ok(session)
    }

    fn turn_context(&self, corrections: Option<Vec<String>>) -> Result<TurnContext, DriverError> {
        let session = self.session.as_ref().ok_or(DriverError::NoActiveSession)?;
        let scenario = self.scenario.clone().ok_or(DriverError::NoActiveSession)?;
        let corrections = corrections.unwrap_or_else(|| self.memory.relevant(&scenario.customer_type));
        Ok(TurnContext {
            session_id: session.id,
            staff_name: self
                .staff
                .as_ref()
                .map(|s| s.name.clone())
                .unwrap_or_else(|| DEFAULT_STAFF_NAME.to_string()),
            staff_role: self.staff.as_ref().map(|s| s.role).unwrap_or(scenario.role),
            memory: self.memory.clone(),
            corrections,
            knowledge_base: self.knowledge_base.clone(),
            guidelines: self.guidelines.clone(),
            history: session.transcript.clone(),
            turn: self.turn,
            scenario,
        })
    }
}

pub struct TrainingDriver {
    generator: TurnGenerator,
    store: Arc<dyn TrainingStore>,
    settings: DriverSettings,
    inner: Mutex<DriverInner>,
    /// Held for the whole of every generating operation so turns never overlap.
    turn_lock: Mutex<()>,
    events: broadcast::Sender<DriverEvent>,
}

impl TrainingDriver {
    pub fn new(generator: TurnGenerator, store: Arc<dyn TrainingStore>, settings: DriverSettings) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            generator,
            store,
            settings,
            inner: Mutex::new(DriverInner {
                session: None,
                scenario: None,
                staff: None,
                memory: TrainingMemory::default(),
                knowledge_base: Vec::new(),
                guidelines: Vec::new(),
                turn: 0,
                manual: false,
                cancel: CancellationToken::new(),
            }),
            turn_lock: Mutex::new(()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub async fn snapshot(&self) -> DriverSnapshot {
        self.inner.lock().await.snapshot()
    }

    pub async fn session(&self) -> Option<TrainingSession> {
        self.inner.lock().await.session.clone()
    }

    pub async fn staff(&self) -> Option<AiStaff> {
        self.inner.lock().await.staff.clone()
    }

    pub async fn memory(&self) -> TrainingMemory {
        self.inner.lock().await.memory.clone()
    }

    fn emit(&self, event: DriverEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    //=====================================================================================
    // Setup
    //=====================================================================================

    /// Selects the staff member to train and loads their memory.
    /// `None` clears the selection.
    pub async fn select_staff(&self, staff_id: Option<Uuid>) -> Result<Option<AiStaff>, DriverError> {
        let staff = match staff_id {
            Some(id) => Some(
                self.store
                    .load_ai_staff()
                    .await?
                    .into_iter()
                    .find(|s| s.id == id)
                    .ok_or(DriverError::UnknownStaff(id))?,
            ),
            None => None,
        };

        let mut inner = self.inner.lock().await;
        if matches!(inner.state(), DriverState::Running | DriverState::Paused) {
            return Err(DriverError::SessionInProgress);
        }
        inner.memory = staff.as_ref().map(|s| s.memory.clone()).unwrap_or_default();
        inner.staff = staff.clone();
        if let Some(s) = &staff {
            info!(staff_id = %s.id, name = %s.name, "Selected AI staff");
        }
        Ok(staff)
    }

    /// Replaces the knowledge base and guidelines handed to the staff persona.
    pub async fn set_grounding(&self, knowledge_base: Vec<KnowledgeEntry>, guidelines: Vec<Guideline>) {
        let mut inner = self.inner.lock().await;
        inner.knowledge_base = knowledge_base;
        inner.guidelines = guidelines;
    }

    //=====================================================================================
    // Transitions
    //=====================================================================================

    /// Starts a fresh session: the customer opens, then staff replies.
    ///
    /// Any session still held by the driver is abandoned.
    pub async fn start(&self, scenario: Scenario) -> Result<TrainingSession, DriverError> {
        let _turn = self.turn_lock.lock().await;

        let (session, token) = {
            let mut inner = self.inner.lock().await;
            inner.cancel.cancel();
            inner.cancel = CancellationToken::new();
            let session = TrainingSession::start(&scenario, inner.staff.as_ref().map(|s| s.id));
            inner.session = Some(session.clone());
            inner.scenario = Some(scenario);
            inner.turn = 0;
            info!(session_id = %session.id, scenario = %session.scenario_id, "Training session started");
            (session, inner.cancel.clone())
        };
        self.emit(DriverEvent::SessionStarted(session.clone()));
        self.emit_state().await;

        let opening = self.produce(Sender::Customer, Some(&token)).await?;
        if opening.as_ref().is_some_and(|m| !m.is_error()) && self.settle(&token).await {
            self.produce(Sender::Staff, Some(&token)).await?;
        }

        let inner = self.inner.lock().await;
        Ok(inner.session.clone().unwrap_or(session))
    }

    /// Produces one customer/staff exchange, or completes the session once
    /// the turn cap has been reached.
    pub async fn auto_step(&self) -> Result<StepOutcome, DriverError> {
        self.step(None).await
    }

    /// One auto step. With a `run` token the step belongs to that auto run
    /// and does nothing once the run has been cancelled.
    async fn step(&self, run: Option<&CancellationToken>) -> Result<StepOutcome, DriverError> {
        let _turn = self.turn_lock.lock().await;

        let token = {
            let mut inner = self.inner.lock().await;
            if run.is_some_and(CancellationToken::is_cancelled) {
                return Ok(StepOutcome::Stopped);
            }
            let session = inner.open_session()?;
            if session.status == SessionStatus::Paused || inner.manual {
                return Ok(StepOutcome::Stopped);
            }
            if inner.turn >= self.settings.max_turns {
                drop(inner);
                self.complete_locked(None, None).await?;
                return Ok(StepOutcome::Completed);
            }
            inner.turn += 1;
            inner.cancel.clone()
        };

        let Some(customer) = self.produce(Sender::Customer, Some(&token)).await? else {
            return Ok(StepOutcome::Stopped);
        };
        if customer.is_error() {
            return Ok(StepOutcome::Advanced);
        }
        if !self.settle(&token).await {
            return Ok(StepOutcome::Stopped);
        }
        match self.produce(Sender::Staff, Some(&token)).await? {
            Some(_) => Ok(StepOutcome::Advanced),
            None => Ok(StepOutcome::Stopped),
        }
    }

    /// Keeps stepping with pacing delays until the session completes, is
    /// paused or manual mode is switched on.
    ///
    /// A run is bound to the cancellation token current when it starts, so a
    /// run left over from before a pause never steps the resumed session.
    pub async fn run_auto(&self) -> Result<StepOutcome, DriverError> {
        let token = self.inner.lock().await.cancel.clone();
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(StepOutcome::Stopped),
                _ = tokio::time::sleep(self.settings.step_delay) => {}
            }
            match self.step(Some(&token)).await? {
                StepOutcome::Advanced => continue,
                outcome => return Ok(outcome),
            }
        }
    }

    /// Appends trainer-typed customer text and generates one staff reply.
    ///
    /// Waits for any in-flight step to finish first.
    pub async fn manual_step(&self, text: &str) -> Result<Message, DriverError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DriverError::EmptyText);
        }
        let _turn = self.turn_lock.lock().await;

        let customer = {
            let inner = self.inner.lock().await;
            let session = inner.open_session()?;
            if session.status == SessionStatus::Paused {
                return Err(DriverError::Paused);
            }
            if !inner.manual {
                return Err(DriverError::NotInManualMode);
            }
            let metadata = MessageMetadata {
                emotion: Some(MANUAL_CUSTOMER_EMOTION.to_string()),
                intent: Some(MessageIntent::ManualCustomer),
                ..Default::default()
            };
            Message::new(session.id, Sender::Customer, text).with_metadata(metadata)
        };
        self.append(customer, None).await;

        self.produce(Sender::Staff, None)
            .await?
            .ok_or(DriverError::NoActiveSession)
    }

    /// Switches between trainer-typed and generated customer messages.
    pub async fn set_manual_mode(&self, enabled: bool) -> DriverSnapshot {
        let snapshot = {
            let mut inner = self.inner.lock().await;
            if enabled {
                inner.cancel.cancel();
            } else if inner.manual {
                inner.cancel = CancellationToken::new();
            }
            inner.manual = enabled;
            inner.snapshot()
        };
        info!(manual = enabled, "Manual mode toggled");
        self.emit(DriverEvent::StateChanged(snapshot.clone()));
        snapshot
    }

    /// Revises the latest staff message with trainer feedback and records
    /// the feedback in training memory. Does not advance the turn counter.
    pub async fn apply_feedback(&self, feedback: &str) -> Result<Message, DriverError> {
        let feedback = feedback.trim();
        if feedback.is_empty() {
            return Err(DriverError::EmptyText);
        }
        let _turn = self.turn_lock.lock().await;

        let (ctx, previous) = {
            let mut inner = self.inner.lock().await;
            let session = inner.open_session()?;
            let previous = session
                .transcript
                .iter()
                .rev()
                .find(|m| m.sender == Sender::Staff && !m.is_error())
                .cloned()
                .ok_or(DriverError::NothingToRevise)?;
            let key = inner
                .scenario
                .as_ref()
                .map(|s| s.customer_type.clone())
                .unwrap_or_default();

            let mut corrections = vec![feedback.to_string()];
            corrections.extend(inner.memory.relevant(&key));
            let ctx = inner.turn_context(Some(corrections))?;

            if let Some(session) = inner.session.as_mut() {
                session.feedback.push(feedback.to_string());
            }
            let entry = memory_entry(&ctx.scenario.name, feedback, &previous.text);
            inner.memory.append(&key, entry);
            (ctx, previous)
        };
        self.persist_staff(false).await;

        let revised = match self.generator.revise(&ctx, &previous, feedback).await {
            Ok(message) => message,
            Err(err) => generator::error_message(ctx.session_id, Sender::Staff, &err),
        };
        self.append(revised.clone(), None).await;
        Ok(revised)
    }

    /// Keeps trainer feedback as a roleplay guideline, which every later
    /// staff prompt on this driver includes.
    pub async fn save_guideline(&self, title: &str, feedback: &str) -> Result<Guideline, DriverError> {
        if feedback.trim().is_empty() {
            return Err(DriverError::EmptyText);
        }
        let guideline = {
            let mut inner = self.inner.lock().await;
            let scenario = inner.scenario.as_ref().ok_or(DriverError::NoActiveSession)?;
            let guideline = prompt::feedback_guideline(scenario, title, feedback);
            inner.guidelines.push(guideline.clone());
            guideline
        };
        info!(title = %guideline.title, "Saved feedback as a guideline");
        self.emit(DriverEvent::GuidelineSaved(guideline.clone()));
        Ok(guideline)
    }

    pub async fn pause(&self) -> Result<DriverSnapshot, DriverError> {
        let snapshot = {
            let mut inner = self.inner.lock().await;
            inner.open_session()?;
            inner.cancel.cancel();
            if let Some(session) = inner.session.as_mut() {
                session.status = SessionStatus::Paused;
            }
            inner.snapshot()
        };
        info!("Training session paused");
        self.emit(DriverEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    pub async fn resume(&self) -> Result<DriverSnapshot, DriverError> {
        let snapshot = {
            let mut inner = self.inner.lock().await;
            if inner.open_session()?.status != SessionStatus::Paused {
                return Err(DriverError::NotPaused);
            }
            if inner.cancel.is_cancelled() && !inner.manual {
                inner.cancel = CancellationToken::new();
            }
            if let Some(session) = inner.session.as_mut() {
                session.status = SessionStatus::Running;
            }
            inner.snapshot()
        };
        info!("Training session resumed");
        self.emit(DriverEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    /// Finalizes and persists the session. Waits for any in-flight step.
    pub async fn complete(&self, score: Option<u8>, summary: Option<String>) -> Result<TrainingSession, DriverError> {
        let _turn = self.turn_lock.lock().await;
        self.complete_locked(score, summary).await
    }

    async fn complete_locked(&self, score: Option<u8>, summary: Option<String>) -> Result<TrainingSession, DriverError> {
        let mut finished = {
            let mut inner = self.inner.lock().await;
            let session = inner.open_session()?.clone();
            let finished = recorder::finalize(session, score, summary).map_err(|_| DriverError::SessionCompleted)?;
            inner.cancel.cancel();
            inner.session = Some(finished.clone());
            finished
        };
        if !self.persist_staff(true).await {
            finished.staff_id = None;
            if let Some(session) = self.inner.lock().await.session.as_mut() {
                session.staff_id = None;
            }
        }
        info!(
            session_id = %finished.id,
            score = finished.score.unwrap_or_default(),
            messages = finished.transcript.len(),
            "Training session completed"
        );

        if let Err(e) = self.store.save_session(&finished).await {
            error!(session_id = %finished.id, "Failed to save training session: {}", e);
        }

        self.emit(DriverEvent::SessionCompleted(finished.clone()));
        self.emit_state().await;
        Ok(finished)
    }

    //=====================================================================================
    // Internals
    //=====================================================================================

    /// Generates a turn for `speaker` and appends it, or its error entry.
    /// Returns `None` when the result was discarded.
    async fn produce(
        &self,
        speaker: Sender,
        token: Option<&CancellationToken>,
    ) -> Result<Option<Message>, DriverError> {
        let ctx = self.inner.lock().await.turn_context(None)?;
        let message = match self.generator.generate_turn(speaker, &ctx).await {
            Ok(message) => message,
            Err(err) => generator::error_message(ctx.session_id, speaker, &err),
        };
        Ok(self.append(message, token).await)
    }

    async fn append(&self, message: Message, token: Option<&CancellationToken>) -> Option<Message> {
        {
            let mut inner = self.inner.lock().await;
            if token.is_some_and(CancellationToken::is_cancelled) {
                warn!(message_id = %message.id, "Discarding generated message after cancellation");
                return None;
            }
            let session = inner
                .session
                .as_mut()
                .filter(|s| s.id == message.session_id && s.status != SessionStatus::Completed);
            let Some(session) = session else {
                warn!(message_id = %message.id, "Discarding message for a session that is no longer active");
                return None;
            };
            session.transcript.push(message.clone());
        }
        self.emit(DriverEvent::MessageAppended(message.clone()));
        Some(message)
    }

    /// Waits the settle delay; false if cancelled meanwhile.
    async fn settle(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(self.settings.settle_delay) => true,
        }
    }

    /// Writes the working memory (and, on completion, one more finished
    /// session) onto the stored staff record, leaving its other fields as
    /// they are in the store. Returns false when the record has been deleted.
    async fn persist_staff(&self, completed: bool) -> bool {
        let (staff_id, memory) = {
            let inner = self.inner.lock().await;
            match inner.staff.as_ref() {
                Some(staff) => (staff.id, inner.memory.clone()),
                None => return true,
            }
        };

        let stored = match self.store.load_ai_staff().await {
            Ok(all) => all.into_iter().find(|s| s.id == staff_id),
            Err(e) => {
                error!(%staff_id, "Failed to load AI staff: {}", e);
                return true;
            }
        };
        let Some(mut staff) = stored else {
            warn!(%staff_id, "AI staff no longer exists; training memory not saved");
            self.inner.lock().await.staff = None;
            return false;
        };

        staff.memory = memory;
        if completed {
            staff.total_sessions += 1;
        }
        if let Err(e) = self.store.save_ai_staff(&staff).await {
            error!(%staff_id, "Failed to save AI staff: {}", e);
        }
        self.inner.lock().await.staff = Some(staff);
        true
    }

    async fn emit_state(&self) {
        let snapshot = self.inner.lock().await.snapshot();
        self.emit(DriverEvent::StateChanged(snapshot));
    }
}

/// The memory line stored for a piece of feedback.
pub fn memory_entry(scenario_name: &str, feedback: &str, original: &str) -> String {
    let excerpt: String = original.chars().take(ORIGINAL_RESPONSE_EXCERPT).collect();
    format!("[{}] {} (Original response: \"{}...\")", scenario_name, feedback, excerpt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::tests::{angry_scenario, ScriptedCustomer, ScriptedStaff};
    use crate::ports::{
        CustomerSimulationService, CustomerTurnRequest, GenerationError, GenerationResult, PortResult,
    };
    use crate::domain::StaffRole;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingStore {
        staff: StdMutex<Vec<AiStaff>>,
        sessions: StdMutex<Vec<TrainingSession>>,
    }

    #[async_trait]
    impl TrainingStore for RecordingStore {
        async fn load_ai_staff(&self) -> PortResult<Vec<AiStaff>> {
            Ok(self.staff.lock().unwrap().clone())
        }
        async fn save_ai_staff(&self, staff: &AiStaff) -> PortResult<()> {
            let mut all = self.staff.lock().unwrap();
            all.retain(|s| s.id != staff.id);
            all.push(staff.clone());
            Ok(())
        }
        async fn delete_ai_staff(&self, staff_id: Uuid) -> PortResult<()> {
            self.staff.lock().unwrap().retain(|s| s.id != staff_id);
            Ok(())
        }
        async fn load_scenarios(&self) -> PortResult<Vec<Scenario>> {
            Ok(vec![])
        }
        async fn save_scenario(&self, scenario: &Scenario) -> PortResult<Scenario> {
            Ok(scenario.clone())
        }
        async fn delete_scenario(&self, _scenario_id: Uuid) -> PortResult<()> {
            Ok(())
        }
        async fn load_sessions(&self) -> PortResult<Vec<TrainingSession>> {
            Ok(self.sessions.lock().unwrap().clone())
        }
        async fn save_session(&self, session: &TrainingSession) -> PortResult<()> {
            self.sessions.lock().unwrap().push(session.clone());
            Ok(())
        }
        async fn delete_session(&self, session_id: Uuid) -> PortResult<()> {
            self.sessions.lock().unwrap().retain(|s| s.id != session_id);
            Ok(())
        }
    }

    /// Blocks every customer reaction until released.
    #[derive(Default)]
    struct GatedCustomer {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl CustomerSimulationService for GatedCustomer {
        async fn open_conversation(&self, _prompt: &str) -> GenerationResult<String> {
            Ok("Hello?".into())
        }
        async fn react(&self, _request: &CustomerTurnRequest) -> GenerationResult<String> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok("late reply".into())
        }
    }

    fn instant() -> DriverSettings {
        DriverSettings {
            max_turns: 8,
            settle_delay: Duration::ZERO,
            step_delay: Duration::ZERO,
        }
    }

    fn driver_with(
        staff: Arc<ScriptedStaff>,
        customer: Arc<dyn CustomerSimulationService>,
        store: Arc<RecordingStore>,
    ) -> TrainingDriver {
        TrainingDriver::new(TurnGenerator::new(staff, customer), store, instant())
    }

    fn driver() -> (TrainingDriver, Arc<ScriptedStaff>, Arc<RecordingStore>) {
        let staff = Arc::new(ScriptedStaff::default());
        let store = Arc::new(RecordingStore::default());
        let driver = driver_with(staff.clone(), Arc::new(ScriptedCustomer::default()), store.clone());
        (driver, staff, store)
    }

    #[tokio::test]
    async fn start_produces_opening_and_first_staff_reply() {
        let (driver, _, _) = driver();
        let session = driver.start(angry_scenario()).await.unwrap();

        assert_eq!(session.transcript.len(), 2);
        assert_eq!(session.transcript[0].sender, Sender::Customer);
        assert_eq!(session.transcript[1].sender, Sender::Staff);
        let snap = driver.snapshot().await;
        assert_eq!(snap.state, DriverState::Running);
        assert_eq!(snap.turn, 0);
    }

    #[tokio::test]
    async fn auto_run_is_bounded_and_completes_the_session() {
        let (driver, _, store) = driver();
        driver.start(angry_scenario()).await.unwrap();

        assert_eq!(driver.run_auto().await.unwrap(), StepOutcome::Completed);

        let session = driver.session().await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.transcript.len(), 2 * (8 + 1));
        assert!(session.transcript.windows(2).all(|w| w[0].sender != w[1].sender));
        assert_eq!(store.sessions.lock().unwrap().len(), 1);
        assert!(matches!(driver.auto_step().await, Err(DriverError::SessionCompleted)));
    }

    #[tokio::test]
    async fn failed_staff_generation_leaves_one_error_entry_and_keeps_running() {
        let staff = Arc::new(ScriptedStaff::failing_with(GenerationError::Rejected("success=false".into())));
        let store = Arc::new(RecordingStore::default());
        let driver = driver_with(staff, Arc::new(ScriptedCustomer::default()), store);

        let session = driver.start(angry_scenario()).await.unwrap();

        let errors: Vec<&Message> = session.transcript.iter().filter(|m| m.is_error()).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].sender, Sender::Staff);
        assert!(errors[0].text.starts_with(generator::TRAINING_ERROR_PREFIX));
        assert_eq!(driver.snapshot().await.state, DriverState::Running);
    }

    #[tokio::test]
    async fn feedback_never_advances_the_turn_counter() {
        let (driver, _, _) = driver();
        driver.start(angry_scenario()).await.unwrap();
        for i in 0..5 {
            let revised = driver.apply_feedback(&format!("be warmer {i}")).await.unwrap();
            assert!(revised.is_revision());
        }
        assert_eq!(driver.snapshot().await.turn, 0);

        driver.run_auto().await.unwrap();
        let session = driver.session().await.unwrap();
        let auto_customer = session
            .transcript
            .iter()
            .filter(|m| m.metadata.intent == Some(MessageIntent::CustomerReply))
            .count();
        assert_eq!(auto_customer, 8);
        assert_eq!(session.feedback.len(), 5);
    }

    #[tokio::test]
    async fn staff_memory_reaches_the_prompt_verbatim() {
        let (driver, staff_port, store) = driver();
        let mut sakura = AiStaff::new("Dr. Sakura", StaffRole::CustomerService);
        sakura.memory.append("angry", "don't mention product X");
        store.staff.lock().unwrap().push(sakura.clone());

        driver.select_staff(Some(sakura.id)).await.unwrap();
        driver.start(angry_scenario()).await.unwrap();

        let requests = staff_port.requests.lock().unwrap();
        assert!(requests[0].prompt.contains("don't mention product X"));
        assert!(requests[0].prompt.contains("You are Dr. Sakura"));
    }

    #[tokio::test]
    async fn feedback_is_stored_in_memory_and_persisted() {
        let (driver, _, store) = driver();
        let sakura = AiStaff::new("Dr. Sakura", StaffRole::CustomerService);
        store.staff.lock().unwrap().push(sakura.clone());
        driver.select_staff(Some(sakura.id)).await.unwrap();
        driver.start(angry_scenario()).await.unwrap();

        let revised = driver.apply_feedback("apologise first").await.unwrap();
        assert_eq!(revised.metadata.feedback.as_deref(), Some("apologise first"));

        let saved = store.staff.lock().unwrap()[0].clone();
        let lessons = saved.memory.get("angry");
        assert_eq!(lessons.len(), 1);
        assert!(lessons[0].starts_with("[Product Complaint] apologise first (Original response: \"staff reply 1"));
        assert_eq!(driver.memory().await, saved.memory);
    }

    #[tokio::test]
    async fn manual_mode_stops_auto_steps_and_accepts_typed_text() {
        let (driver, staff_port, _) = driver();
        driver.start(angry_scenario()).await.unwrap();
        assert!(matches!(driver.manual_step("hi").await, Err(DriverError::NotInManualMode)));

        driver.set_manual_mode(true).await;
        assert_eq!(driver.auto_step().await.unwrap(), StepOutcome::Stopped);

        let reply = driver.manual_step("Can I get a refund?").await.unwrap();
        assert_eq!(reply.metadata.intent, Some(MessageIntent::CoachResponseToManual));
        let session = driver.session().await.unwrap();
        let typed = &session.transcript[2];
        assert_eq!(typed.metadata.intent, Some(MessageIntent::ManualCustomer));
        assert_eq!(typed.metadata.emotion.as_deref(), Some(MANUAL_CUSTOMER_EMOTION));
        assert_eq!(staff_port.requests.lock().unwrap()[1].customer_message, "Can I get a refund?");

        driver.set_manual_mode(false).await;
        assert_eq!(driver.auto_step().await.unwrap(), StepOutcome::Advanced);
    }

    #[tokio::test]
    async fn pausing_discards_an_in_flight_auto_turn() {
        let customer = Arc::new(GatedCustomer::default());
        let driver = Arc::new(driver_with(
            Arc::new(ScriptedStaff::default()),
            customer.clone(),
            Arc::new(RecordingStore::default()),
        ));
        driver.start(angry_scenario()).await.unwrap();

        let stepping = tokio::spawn({
            let driver = driver.clone();
            async move { driver.auto_step().await }
        });
        customer.entered.notified().await;
        driver.pause().await.unwrap();
        customer.release.notify_one();

        assert_eq!(stepping.await.unwrap().unwrap(), StepOutcome::Stopped);
        assert_eq!(driver.session().await.unwrap().transcript.len(), 2);
        assert_eq!(driver.auto_step().await.unwrap(), StepOutcome::Stopped);

        driver.resume().await.unwrap();
        assert_eq!(driver.snapshot().await.state, DriverState::Running);
    }

    #[tokio::test]
    async fn manual_text_waits_for_the_in_flight_step() {
        let customer = Arc::new(GatedCustomer::default());
        let driver = Arc::new(driver_with(
            Arc::new(ScriptedStaff::default()),
            customer.clone(),
            Arc::new(RecordingStore::default()),
        ));
        driver.start(angry_scenario()).await.unwrap();

        let stepping = tokio::spawn({
            let driver = driver.clone();
            async move { driver.auto_step().await }
        });
        customer.entered.notified().await;
        driver.set_manual_mode(true).await;
        let typed = tokio::spawn({
            let driver = driver.clone();
            async move { driver.manual_step("are you there?").await }
        });
        customer.release.notify_one();

        assert_eq!(stepping.await.unwrap().unwrap(), StepOutcome::Stopped);
        typed.await.unwrap().unwrap();
        let transcript = driver.session().await.unwrap().transcript;
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[2].text, "are you there?");
        assert!(transcript.iter().all(|m| m.text != "late reply"));
    }

    #[tokio::test]
    async fn completed_sessions_reject_further_changes() {
        let (driver, _, store) = driver();
        let sakura = AiStaff::new("Dr. Sakura", StaffRole::Sales);
        store.staff.lock().unwrap().push(sakura.clone());
        driver.select_staff(Some(sakura.id)).await.unwrap();
        driver.start(angry_scenario()).await.unwrap();

        let done = driver.complete(Some(90), None).await.unwrap();
        assert_eq!(done.score, Some(90));
        assert_eq!(store.staff.lock().unwrap()[0].total_sessions, 1);

        assert!(matches!(driver.complete(None, None).await, Err(DriverError::SessionCompleted)));
        assert!(matches!(driver.apply_feedback("late").await, Err(DriverError::SessionCompleted)));
        assert!(matches!(driver.pause().await, Err(DriverError::SessionCompleted)));
    }

    #[tokio::test]
    async fn commands_without_a_session_are_rejected() {
        let (driver, _, _) = driver();
        assert!(matches!(driver.auto_step().await, Err(DriverError::NoActiveSession)));
        assert!(matches!(driver.apply_feedback("x").await, Err(DriverError::NoActiveSession)));
        assert!(matches!(driver.apply_feedback("  ").await, Err(DriverError::EmptyText)));
        assert!(matches!(
            driver.select_staff(Some(Uuid::new_v4())).await,
            Err(DriverError::UnknownStaff(_))
        ));
    }

    fn driver_and_customer() -> (TrainingDriver, Arc<ScriptedStaff>, Arc<ScriptedCustomer>) {
        let staff = Arc::new(ScriptedStaff::default());
        let customer = Arc::new(ScriptedCustomer::default());
        let driver = driver_with(staff.clone(), customer.clone(), Arc::new(RecordingStore::default()));
        (driver, staff, customer)
    }

    #[tokio::test]
    async fn failed_opening_gets_no_staff_reply_and_dialogue_continues() {
        let (driver, staff_port, customer) = driver_and_customer();
        customer.fail_next(GenerationError::Transport("connection refused".into()));

        let session = driver.start(angry_scenario()).await.unwrap();
        assert_eq!(session.transcript.len(), 1);
        assert!(session.transcript[0].is_error());
        assert_eq!(session.transcript[0].sender, Sender::Customer);
        assert!(staff_port.requests.lock().unwrap().is_empty());
        assert_eq!(driver.snapshot().await.state, DriverState::Running);

        assert_eq!(driver.auto_step().await.unwrap(), StepOutcome::Advanced);
        let transcript = driver.session().await.unwrap().transcript;
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[2].sender, Sender::Staff);
        assert!(!transcript[2].is_error());
    }

    #[tokio::test]
    async fn failed_customer_reply_ends_the_exchange_only() {
        let (driver, _, customer) = driver_and_customer();
        driver.start(angry_scenario()).await.unwrap();
        customer.fail_next(GenerationError::Status {
            status: 502,
            body: "bad gateway".into(),
        });

        assert_eq!(driver.auto_step().await.unwrap(), StepOutcome::Advanced);
        let transcript = driver.session().await.unwrap().transcript;
        assert_eq!(transcript.len(), 3);
        assert!(transcript[2].is_error());
        assert_eq!(transcript[2].sender, Sender::Customer);
        assert_eq!(transcript.iter().filter(|m| m.is_error()).count(), 1);
        assert_eq!(driver.snapshot().await.state, DriverState::Running);

        assert_eq!(driver.auto_step().await.unwrap(), StepOutcome::Advanced);
        let transcript = driver.session().await.unwrap().transcript;
        assert_eq!(transcript.len(), 5);
        assert_eq!(transcript[3].sender, Sender::Customer);
        assert_eq!(transcript[4].sender, Sender::Staff);
        assert_eq!(driver.snapshot().await.turn, 2);
    }

    #[tokio::test]
    async fn resume_requires_a_paused_session() {
        let (driver, _, _) = driver();
        driver.start(angry_scenario()).await.unwrap();
        assert!(matches!(driver.resume().await, Err(DriverError::NotPaused)));

        driver.pause().await.unwrap();
        assert_eq!(driver.resume().await.unwrap().state, DriverState::Running);
    }

    #[tokio::test]
    async fn complete_waits_for_the_in_flight_step_and_persists() {
        let customer = Arc::new(GatedCustomer::default());
        let store = Arc::new(RecordingStore::default());
        let driver = Arc::new(driver_with(Arc::new(ScriptedStaff::default()), customer.clone(), store.clone()));
        driver.start(angry_scenario()).await.unwrap();

        let running = tokio::spawn({
            let driver = driver.clone();
            async move { driver.run_auto().await }
        });
        customer.entered.notified().await;
        let completing = tokio::spawn({
            let driver = driver.clone();
            async move { driver.complete(None, None).await }
        });
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        customer.release.notify_one();

        let done = completing.await.unwrap().unwrap();
        assert_eq!(running.await.unwrap().unwrap(), StepOutcome::Stopped);
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.transcript.len(), 4);
        assert!(done.transcript.windows(2).all(|w| w[0].sender != w[1].sender));

        let saved = store.sessions.lock().unwrap().clone();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].transcript.len(), 4);
    }

    #[tokio::test]
    async fn an_auto_run_from_before_a_pause_never_steps_the_resumed_session() {
        let customer = Arc::new(GatedCustomer::default());
        let driver = Arc::new(driver_with(
            Arc::new(ScriptedStaff::default()),
            customer.clone(),
            Arc::new(RecordingStore::default()),
        ));
        driver.start(angry_scenario()).await.unwrap();

        let stale = tokio::spawn({
            let driver = driver.clone();
            async move { driver.run_auto().await }
        });
        customer.entered.notified().await;
        driver.pause().await.unwrap();
        driver.resume().await.unwrap();
        customer.release.notify_one();

        assert_eq!(stale.await.unwrap().unwrap(), StepOutcome::Stopped);
        let transcript = driver.session().await.unwrap().transcript;
        assert_eq!(transcript.len(), 2);
        assert!(transcript.iter().all(|m| m.text != "late reply"));
        assert_eq!(driver.snapshot().await.state, DriverState::Running);
    }

    #[tokio::test]
    async fn staff_edits_made_elsewhere_survive_feedback() {
        let (driver, _, store) = driver();
        let sakura = AiStaff::new("Dr. Sakura", StaffRole::CustomerService);
        store.staff.lock().unwrap().push(sakura.clone());
        driver.select_staff(Some(sakura.id)).await.unwrap();
        driver.start(angry_scenario()).await.unwrap();

        let mut renamed = sakura.clone();
        renamed.name = "Dr. Sakura Mori".into();
        store.save_ai_staff(&renamed).await.unwrap();

        driver.apply_feedback("apologise first").await.unwrap();
        let saved = store.staff.lock().unwrap()[0].clone();
        assert_eq!(saved.name, "Dr. Sakura Mori");
        assert_eq!(saved.memory.get("angry").len(), 1);
        assert_eq!(driver.staff().await.unwrap().name, "Dr. Sakura Mori");
    }

    #[tokio::test]
    async fn deleted_staff_is_not_recreated_on_completion() {
        let (driver, _, store) = driver();
        let sakura = AiStaff::new("Dr. Sakura", StaffRole::CustomerService);
        store.staff.lock().unwrap().push(sakura.clone());
        driver.select_staff(Some(sakura.id)).await.unwrap();
        driver.start(angry_scenario()).await.unwrap();

        store.delete_ai_staff(sakura.id).await.unwrap();
        let done = driver.complete(Some(70), None).await.unwrap();

        assert!(store.staff.lock().unwrap().is_empty());
        assert_eq!(done.staff_id, None);
        let saved = store.sessions.lock().unwrap().clone();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].staff_id, None);
    }

    #[tokio::test]
    async fn saved_guideline_reaches_later_staff_prompts() {
        let (driver, staff_port, _) = driver();
        assert!(matches!(
            driver.save_guideline("", "Offer a replacement").await,
            Err(DriverError::NoActiveSession)
        ));
        driver.start(angry_scenario()).await.unwrap();
        let mut events = driver.subscribe();

        let guideline = driver.save_guideline("", "Offer a replacement before a refund").await.unwrap();
        assert_eq!(guideline.title, "Roleplay Training: Product Complaint");
        assert_eq!(guideline.category, "roleplay");
        assert!(matches!(events.recv().await.unwrap(), DriverEvent::GuidelineSaved(g) if g == guideline));

        driver.auto_step().await.unwrap();
        let requests = staff_port.requests.lock().unwrap();
        let last = requests.last().unwrap();
        assert!(last.prompt.contains("**Roleplay Training: Product Complaint**\nOffer a replacement before a refund"));
        assert_eq!(last.guidelines.len(), 1);
    }
}
