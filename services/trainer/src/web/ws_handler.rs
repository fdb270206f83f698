//! services/trainer/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a training console
//! WebSocket connection. Each connection owns one dialogue driver; trainer
//! commands arrive as JSON text frames and driver events are pushed back.

use crate::{
    error::ApiError,
    web::{
        protocol::{ClientMessage, GuidelineDto, KnowledgeDto, ServerMessage, StaffDto},
        state::{AppState, ConnectionState},
    },
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use roleplay_training_core::{DriverEvent, DriverSnapshot, DriverState, TrainingDriver};
use std::{future::Future, sync::Arc};
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("New training console connection established");

    // The sender is wrapped in an Arc<Mutex<>> so the event forwarder and command tasks can share it.
    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    // --- 1. Initialization Phase ---
    let mut connection = match receiver.next().await {
        Some(Ok(Message::Text(init_json))) => match serde_json::from_str::<ClientMessage>(&init_json) {
            Ok(ClientMessage::Init {
                staff_id,
                knowledge_base,
                guidelines,
            }) => match initialize(&app_state, staff_id, knowledge_base, guidelines).await {
                Ok((connection, staff)) => {
                    if send_json(&ws_sender, &ServerMessage::Initialized { staff }).await.is_err() {
                        error!("Failed to send initialized message.");
                        return;
                    }
                    connection
                }
                Err(e) => {
                    error!("Failed to initialize training connection: {}", e);
                    let _ = send_error(&ws_sender, &e).await;
                    return;
                }
            },
            _ => {
                error!("First message was not a valid Init message.");
                let _ = send_json(
                    &ws_sender,
                    &ServerMessage::Error {
                        message: "The first message must be init.".to_string(),
                    },
                )
                .await;
                return;
            }
        },
        _ => {
            error!("Client disconnected before sending Init message.");
            return;
        }
    };

    let forwarder = tokio::spawn(forward_events(connection.driver.subscribe(), ws_sender.clone()));

    // --- 2. Main Message Loop ---
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                handle_text_message(text.to_string(), &app_state, &mut connection, &ws_sender).await;
            }
            Ok(Message::Close(_)) => {
                info!("Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive failed: {}", e);
                break;
            }
        }
    }

    // --- 3. Cleanup ---
    // Cancelling through the driver lets an in-flight step settle instead of
    // being cut off halfway.
    if connection.driver.snapshot().await.state == DriverState::Running {
        let _ = connection.driver.pause().await;
    }
    forwarder.abort();
    info!("Training console connection closed.");
}

/// Builds the connection's driver and applies the Init selections.
async fn initialize(
    app_state: &AppState,
    staff_id: Option<Uuid>,
    knowledge_base: Vec<KnowledgeDto>,
    guidelines: Vec<GuidelineDto>,
) -> Result<(ConnectionState, Option<StaffDto>), ApiError> {
    let driver = app_state.new_driver();
    driver
        .set_grounding(
            knowledge_base.into_iter().map(Into::into).collect(),
            guidelines.into_iter().map(Into::into).collect(),
        )
        .await;
    let staff = driver.select_staff(staff_id).await?;
    info!(
        staff = staff.as_ref().map(|s| s.name.as_str()).unwrap_or("none"),
        "Training connection initialized"
    );
    Ok((ConnectionState::new(driver), staff.as_ref().map(StaffDto::from)))
}

/// Pushes every driver event to the client until the socket or driver goes away.
async fn forward_events(mut events: broadcast::Receiver<DriverEvent>, ws_sender: WsSender) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if send_json(&ws_sender, &ServerMessage::from(event)).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event forwarder lagged; {} driver events were dropped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Helper function to handle the logic for different `ClientMessage` variants.
async fn handle_text_message(
    text: String,
    app_state: &AppState,
    connection: &mut ConnectionState,
    ws_sender: &WsSender,
) {
    let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            let _ = send_error(ws_sender, &ApiError::BadRequest(e.to_string())).await;
            return;
        }
    };

    let driver = connection.driver.clone();
    let result: Result<(), ApiError> = match client_msg {
        ClientMessage::Init { .. } => {
            warn!("Received subsequent Init message, which is ignored.");
            Ok(())
        }
        ClientMessage::Start { scenario_id } => {
            info!(%scenario_id, "Start message received.");
            start_session(app_state, connection, scenario_id, ws_sender).await
        }
        ClientMessage::SetManual { enabled } => {
            let before = driver.snapshot().await;
            let after = driver.set_manual_mode(enabled).await;
            if leaves_manual_while_running(&before, &after) {
                spawn_auto(connection, ws_sender);
            }
            Ok(())
        }
        ClientMessage::ManualMessage { text } => {
            spawn_command(ws_sender, async move {
                driver.manual_step(&text).await?;
                Ok(())
            });
            Ok(())
        }
        ClientMessage::SaveGuideline { title, text } => {
            info!("Save guideline message received.");
            // The guideline is echoed through the driver's event stream.
            driver
                .save_guideline(title.as_deref().unwrap_or_default(), &text)
                .await
                .map(|_| ())
                .map_err(ApiError::from)
        }
        ClientMessage::Feedback { text } => {
            info!("Feedback message received.");
            spawn_command(ws_sender, async move {
                driver.apply_feedback(&text).await?;
                Ok(())
            });
            Ok(())
        }
        ClientMessage::Pause => {
            info!("Pause message received.");
            driver.pause().await.map(|_| ()).map_err(ApiError::from)
        }
        ClientMessage::Resume => {
            info!("Resume message received.");
            match driver.resume().await {
                Ok(snapshot) => {
                    if !snapshot.manual {
                        spawn_auto(connection, ws_sender);
                    }
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        ClientMessage::Complete { score, summary } => {
            info!("Complete message received.");
            // Waits for any in-flight step, which then stops on the cancelled token.
            spawn_command(ws_sender, async move {
                driver.complete(score, summary).await?;
                Ok(())
            });
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!("Client command failed: {}", e);
        let _ = send_error(ws_sender, &e).await;
    }
}

/// Replaces any running session with a new one for the stored scenario and
/// starts stepping in the background.
async fn start_session(
    app_state: &AppState,
    connection: &mut ConnectionState,
    scenario_id: Uuid,
    ws_sender: &WsSender,
) -> Result<(), ApiError> {
    let scenario = app_state
        .store
        .load_scenarios()
        .await?
        .into_iter()
        .find(|s| s.id == scenario_id)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown scenario {}", scenario_id)))?;

    let driver = connection.driver.clone();
    let ws_sender = ws_sender.clone();
    connection.track_auto_task(tokio::spawn(async move {
        if let Err(e) = driver.start(scenario).await {
            error!("Failed to start training session: {}", e);
            let _ = send_error(&ws_sender, &ApiError::from(e)).await;
            return;
        }
        run_auto(&driver, &ws_sender).await;
    }));
    Ok(())
}

/// Restarts background stepping after resume or leaving manual mode.
///
/// Callers only get here after the driver issued a fresh cancellation token,
/// so any earlier run is already bound to a cancelled one.
fn spawn_auto(connection: &mut ConnectionState, ws_sender: &WsSender) {
    let driver = connection.driver.clone();
    let ws_sender = ws_sender.clone();
    connection.track_auto_task(tokio::spawn(async move {
        run_auto(&driver, &ws_sender).await;
    }));
}

/// Auto stepping restarts only when manual mode was actually switched off on
/// a running session.
fn leaves_manual_while_running(before: &DriverSnapshot, after: &DriverSnapshot) -> bool {
    before.manual && !after.manual && after.state == DriverState::Running
}

async fn run_auto(driver: &TrainingDriver, ws_sender: &WsSender) {
    match driver.run_auto().await {
        Ok(outcome) => info!(?outcome, "Auto stepping stopped"),
        Err(e) => {
            error!("Auto stepping failed: {}", e);
            let _ = send_error(ws_sender, &ApiError::from(e)).await;
        }
    }
}

/// Runs a generating command off the receive loop so pause stays responsive.
fn spawn_command<F>(ws_sender: &WsSender, command: F)
where
    F: Future<Output = Result<(), ApiError>> + Send + 'static,
{
    let ws_sender = ws_sender.clone();
    tokio::spawn(async move {
        if let Err(e) = command.await {
            warn!("Client command failed: {}", e);
            let _ = send_error(&ws_sender, &e).await;
        }
    });
}

async fn send_error(ws_sender: &WsSender, err: &ApiError) -> Result<(), ApiError> {
    send_json(
        ws_sender,
        &ServerMessage::Error {
            message: err.to_string(),
        },
    )
    .await
}

async fn send_json(ws_sender: &WsSender, msg: &ServerMessage) -> Result<(), ApiError> {
    let json = serde_json::to_string(msg).map_err(|e| ApiError::Internal(e.to_string()))?;
    ws_sender.lock().await.send(Message::Text(json.into())).await?;
    Ok(())
}
