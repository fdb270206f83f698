//! services/trainer/src/adapters/memory_store.rs
//!
//! A process-local `TrainingStore`, used when no database is configured.

use async_trait::async_trait;
use roleplay_training_core::domain::{AiStaff, Scenario, TrainingSession};
use roleplay_training_core::ports::{PortError, PortResult, TrainingStore};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Keeps whole records in insertion order, upserting by id.
#[derive(Default)]
pub struct InMemoryStore {
    staff: RwLock<Vec<AiStaff>>,
    scenarios: RwLock<Vec<Scenario>>,
    sessions: RwLock<Vec<TrainingSession>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn upsert<T: Clone>(items: &mut Vec<T>, item: &T, same: impl Fn(&T) -> bool) {
    match items.iter_mut().find(|existing| same(existing)) {
        Some(existing) => *existing = item.clone(),
        None => items.push(item.clone()),
    }
}

fn remove<T>(items: &mut Vec<T>, what: &str, id: Uuid, same: impl Fn(&T) -> bool) -> PortResult<()> {
    let before = items.len();
    items.retain(|item| !same(item));
    if items.len() == before {
        return Err(PortError::NotFound(format!("{} {} not found", what, id)));
    }
    Ok(())
}

#[async_trait]
impl TrainingStore for InMemoryStore {
    async fn load_ai_staff(&self) -> PortResult<Vec<AiStaff>> {
        Ok(self.staff.read().await.clone())
    }

    async fn save_ai_staff(&self, staff: &AiStaff) -> PortResult<()> {
        upsert(&mut *self.staff.write().await, staff, |s| s.id == staff.id);
        Ok(())
    }

    async fn delete_ai_staff(&self, staff_id: Uuid) -> PortResult<()> {
        remove(&mut *self.staff.write().await, "AI staff", staff_id, |s| s.id == staff_id)
    }

    async fn load_scenarios(&self) -> PortResult<Vec<Scenario>> {
        Ok(self.scenarios.read().await.clone())
    }

    async fn save_scenario(&self, scenario: &Scenario) -> PortResult<Scenario> {
        upsert(&mut *self.scenarios.write().await, scenario, |s| s.id == scenario.id);
        Ok(scenario.clone())
    }

    async fn delete_scenario(&self, scenario_id: Uuid) -> PortResult<()> {
        remove(&mut *self.scenarios.write().await, "Scenario", scenario_id, |s| s.id == scenario_id)
    }

    async fn load_sessions(&self) -> PortResult<Vec<TrainingSession>> {
        let mut sessions = self.sessions.read().await.clone();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    async fn save_session(&self, session: &TrainingSession) -> PortResult<()> {
        upsert(&mut *self.sessions.write().await, session, |s| s.id == session.id);
        Ok(())
    }

    async fn delete_session(&self, session_id: Uuid) -> PortResult<()> {
        remove(&mut *self.sessions.write().await, "Session", session_id, |s| s.id == session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roleplay_training_core::catalog;
    use roleplay_training_core::domain::StaffRole;

    #[tokio::test]
    async fn instantiated_scenario_survives_a_round_trip() {
        let store = InMemoryStore::new();
        let template = &catalog::templates_for(StaffRole::Coach)[0];
        let scenario = catalog::instantiate(template);

        let saved = store.save_scenario(&scenario).await.unwrap();
        let loaded = store.load_scenarios().await.unwrap();
        assert_eq!(saved, scenario);
        assert_eq!(loaded, vec![scenario]);
    }

    #[tokio::test]
    async fn saving_twice_updates_in_place() {
        let store = InMemoryStore::new();
        let mut staff = AiStaff::new("Dr. Sakura", StaffRole::Scientist);
        store.save_ai_staff(&staff).await.unwrap();
        staff.memory.append("angry", "slow down");
        store.save_ai_staff(&staff).await.unwrap();

        let all = store.load_ai_staff().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].memory.get("angry"), ["slow down".to_string()]);
    }

    #[tokio::test]
    async fn deleting_a_missing_record_is_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.delete_session(Uuid::new_v4()).await,
            Err(PortError::NotFound(_))
        ));
    }
}
