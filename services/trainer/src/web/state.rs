//! services/trainer/src/web/state.rs
//!
//! Defines the application's shared and connection-specific states.

use crate::config::Config;
use roleplay_training_core::catalog;
use roleplay_training_core::domain::StaffRole;
use roleplay_training_core::ports::{PortResult, TrainingStore};
use roleplay_training_core::{TrainingDriver, TurnGenerator};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TrainingStore>,
    pub generator: TurnGenerator,
    pub config: Arc<Config>,
}

impl AppState {
    /// Stores the preset scenarios for every role that has none yet.
    pub async fn seed_default_scenarios(&self) -> PortResult<usize> {
        let existing = self.store.load_scenarios().await?;
        let mut seeded = 0;
        for role in StaffRole::ALL {
            if existing.iter().any(|s| s.role == role) {
                continue;
            }
            for scenario in catalog::default_scenarios(role) {
                self.store.save_scenario(&scenario).await?;
                seeded += 1;
            }
        }
        if seeded > 0 {
            info!("Seeded {} default training scenarios", seeded);
        }
        Ok(seeded)
    }

    /// A fresh driver for one connection.
    pub fn new_driver(&self) -> TrainingDriver {
        TrainingDriver::new(
            self.generator.clone(),
            self.store.clone(),
            self.config.driver_settings(),
        )
    }
}

//=========================================================================================
// ConnectionState (Specific to One WebSocket Connection)
//=========================================================================================

/// The state for a single, active WebSocket connection.
pub struct ConnectionState {
    pub driver: Arc<TrainingDriver>,
    /// The most recent task running `start` and auto stepping, if any.
    pub auto_task: Option<JoinHandle<()>>,
}

impl ConnectionState {
    pub fn new(driver: TrainingDriver) -> Self {
        Self {
            driver: Arc::new(driver),
            auto_task: None,
        }
    }

    /// Records a newly spawned stepping task. An earlier task is never
    /// aborted: its auto run is bound to a cancelled token and stops on its
    /// own once any in-flight generation has settled.
    pub fn track_auto_task(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.auto_task.replace(handle) {
            if !previous.is_finished() {
                debug!("Previous auto stepping task is still winding down");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roleplay_training_core::ports::{
        CustomerSimulationService, CustomerTurnRequest, GenerationResult, StaffResponseService,
        StaffTurnRequest,
    };
    use roleplay_training_core::DriverSettings;
    use crate::adapters::InMemoryStore;
    use async_trait::async_trait;
    use tokio::sync::oneshot;

    struct Echo;

    #[async_trait]
    impl StaffResponseService for Echo {
        async fn respond(&self, request: &StaffTurnRequest) -> GenerationResult<String> {
            Ok(format!("re: {}", request.customer_message))
        }
    }

    #[async_trait]
    impl CustomerSimulationService for Echo {
        async fn open_conversation(&self, _prompt: &str) -> GenerationResult<String> {
            Ok("Hello".into())
        }
        async fn react(&self, _request: &CustomerTurnRequest) -> GenerationResult<String> {
            Ok("Okay".into())
        }
    }

    fn connection() -> ConnectionState {
        let generator = TurnGenerator::new(Arc::new(Echo), Arc::new(Echo));
        let driver = TrainingDriver::new(generator, Arc::new(InMemoryStore::new()), DriverSettings::default());
        ConnectionState::new(driver)
    }

    #[tokio::test]
    async fn replacing_the_auto_task_lets_the_previous_one_finish() {
        let mut connection = connection();
        let (tx, rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        connection.track_auto_task(tokio::spawn(async move {
            let _ = rx.await;
            let _ = done_tx.send(());
        }));
        connection.track_auto_task(tokio::spawn(async {}));

        tx.send(()).unwrap();
        assert!(done_rx.await.is_ok());
    }
}
