//! services/trainer/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::protocol::{PersonaDto, ScenarioDto, SessionDto, StaffDto, TemplateDto};
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use roleplay_training_core::catalog;
use roleplay_training_core::domain::{AiStaff, Scenario, ScenarioDifficulty, StaffRole};
use roleplay_training_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_personas_handler,
        list_templates_handler,
        list_staff_handler,
        create_staff_handler,
        rename_staff_handler,
        delete_staff_handler,
        list_scenarios_handler,
        create_scenario_handler,
        delete_scenario_handler,
        generate_scenarios_handler,
        templates_exhausted_handler,
        list_sessions_handler,
        delete_session_handler,
        session_stats_handler,
    ),
    components(
        schemas(
            PersonaDto, TemplateDto, StaffDto, ScenarioDto, SessionDto,
            CreateStaffRequest, RenameStaffRequest, CreateScenarioRequest,
            ExhaustedResponse, SessionStats,
        )
    ),
    tags(
        (name = "Roleplay Trainer API", description = "Manage AI staff, scenarios and recorded training sessions.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
pub struct CreateStaffRequest {
    pub name: String,
    pub role: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct RenameStaffRequest {
    /// A blank name deletes the staff member.
    pub name: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct CreateScenarioRequest {
    pub role: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub situation: String,
    pub customer_type: String,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default = "default_duration")]
    pub duration_mins: u32,
    pub difficulty: String,
}

fn default_duration() -> u32 {
    15
}

impl CreateScenarioRequest {
    fn into_domain(self) -> Result<Scenario, ApiError> {
        let role = parse_role(&self.role)?;
        let difficulty = self
            .difficulty
            .parse::<ScenarioDifficulty>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        if self.name.trim().is_empty() {
            return Err(ApiError::BadRequest("Scenario name must not be empty".to_string()));
        }
        if catalog::persona(&self.customer_type).is_none() {
            return Err(ApiError::BadRequest(format!(
                "Unknown customer type '{}'",
                self.customer_type
            )));
        }
        Ok(Scenario {
            id: Uuid::new_v4(),
            role,
            name: self.name.trim().to_string(),
            description: self.description,
            situation: self.situation,
            customer_type: self.customer_type,
            success_criteria: self.success_criteria,
            duration_mins: self.duration_mins,
            difficulty,
        })
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ExhaustedResponse {
    pub role: &'static str,
    pub exhausted: bool,
}

#[derive(Serialize, Debug, PartialEq, ToSchema)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub completed_sessions: usize,
    /// Mean of the scored sessions, if any.
    pub average_score: Option<f64>,
}

impl SessionStats {
    pub fn from_scores(total_sessions: usize, completed_sessions: usize, scores: &[u8]) -> Self {
        let average_score = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().map(|&s| f64::from(s)).sum::<f64>() / scores.len() as f64)
        };
        Self {
            total_sessions,
            completed_sessions,
            average_score,
        }
    }
}

fn parse_role(raw: &str) -> Result<StaffRole, ApiError> {
    raw.parse::<StaffRole>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn find_staff(app_state: &AppState, staff_id: Uuid) -> Result<AiStaff, ApiError> {
    app_state
        .store
        .load_ai_staff()
        .await?
        .into_iter()
        .find(|s| s.id == staff_id)
        .ok_or_else(|| ApiError::Port(PortError::NotFound(format!("AI staff {} not found", staff_id))))
}

//=========================================================================================
// Catalog Handlers
//=========================================================================================

/// List the built-in customer personas.
#[utoipa::path(
    get,
    path = "/personas",
    responses((status = 200, description = "All personas", body = [PersonaDto]))
)]
pub async fn list_personas_handler() -> Json<Vec<PersonaDto>> {
    Json(catalog::list_personas().into_iter().map(PersonaDto::from).collect())
}

/// List the scenario templates for a staff role.
#[utoipa::path(
    get,
    path = "/templates/{role}",
    params(("role" = String, Path, description = "coach, sales, customer-service or scientist")),
    responses(
        (status = 200, description = "Templates for the role", body = [TemplateDto]),
        (status = 400, description = "Unknown role")
    )
)]
pub async fn list_templates_handler(Path(role): Path<String>) -> Result<Json<Vec<TemplateDto>>, ApiError> {
    let role = parse_role(&role)?;
    Ok(Json(catalog::templates_for(role).iter().map(TemplateDto::from).collect()))
}

//=========================================================================================
// AI Staff Handlers
//=========================================================================================

/// List all AI staff members with their training memory.
#[utoipa::path(
    get,
    path = "/staff",
    responses((status = 200, description = "All staff", body = [StaffDto]))
)]
pub async fn list_staff_handler(State(app_state): State<Arc<AppState>>) -> Result<Json<Vec<StaffDto>>, ApiError> {
    let staff = app_state.store.load_ai_staff().await?;
    Ok(Json(staff.iter().map(StaffDto::from).collect()))
}

/// Create an AI staff member with empty memory.
#[utoipa::path(
    post,
    path = "/staff",
    request_body = CreateStaffRequest,
    responses(
        (status = 201, description = "Staff created", body = StaffDto),
        (status = 400, description = "Blank name or unknown role")
    )
)]
pub async fn create_staff_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateStaffRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Staff name must not be empty".to_string()));
    }
    let staff = AiStaff::new(name, parse_role(&payload.role)?);
    app_state.store.save_ai_staff(&staff).await?;
    info!(staff_id = %staff.id, name = %staff.name, "Created AI staff");
    Ok((StatusCode::CREATED, Json(StaffDto::from(&staff))))
}

/// Rename an AI staff member. A blank name deletes them.
#[utoipa::path(
    put,
    path = "/staff/{id}",
    request_body = RenameStaffRequest,
    params(("id" = Uuid, Path, description = "Staff id")),
    responses(
        (status = 200, description = "Staff renamed", body = StaffDto),
        (status = 204, description = "Staff deleted by blank rename"),
        (status = 404, description = "Unknown staff")
    )
)]
pub async fn rename_staff_handler(
    State(app_state): State<Arc<AppState>>,
    Path(staff_id): Path<Uuid>,
    Json(payload): Json<RenameStaffRequest>,
) -> Result<axum::response::Response, ApiError> {
    let mut staff = find_staff(&app_state, staff_id).await?;
    let name = payload.name.trim();
    if name.is_empty() {
        app_state.store.delete_ai_staff(staff_id).await?;
        info!(%staff_id, "Deleted AI staff by blank rename");
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    staff.name = name.to_string();
    app_state.store.save_ai_staff(&staff).await?;
    Ok(Json(StaffDto::from(&staff)).into_response())
}

/// Delete an AI staff member and their memory.
#[utoipa::path(
    delete,
    path = "/staff/{id}",
    params(("id" = Uuid, Path, description = "Staff id")),
    responses(
        (status = 204, description = "Staff deleted"),
        (status = 404, description = "Unknown staff")
    )
)]
pub async fn delete_staff_handler(
    State(app_state): State<Arc<AppState>>,
    Path(staff_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    app_state.store.delete_ai_staff(staff_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Scenario Handlers
//=========================================================================================

/// List all stored training scenarios.
#[utoipa::path(
    get,
    path = "/scenarios",
    responses((status = 200, description = "All scenarios", body = [ScenarioDto]))
)]
pub async fn list_scenarios_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<ScenarioDto>>, ApiError> {
    let scenarios = app_state.store.load_scenarios().await?;
    Ok(Json(scenarios.iter().map(ScenarioDto::from).collect()))
}

/// Store a custom training scenario.
#[utoipa::path(
    post,
    path = "/scenarios",
    request_body = CreateScenarioRequest,
    responses(
        (status = 201, description = "Scenario stored", body = ScenarioDto),
        (status = 400, description = "Invalid scenario")
    )
)]
pub async fn create_scenario_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateScenarioRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let scenario = payload.into_domain()?;
    let saved = app_state.store.save_scenario(&scenario).await?;
    Ok((StatusCode::CREATED, Json(ScenarioDto::from(&saved))))
}

/// Delete a stored training scenario.
#[utoipa::path(
    delete,
    path = "/scenarios/{id}",
    params(("id" = Uuid, Path, description = "Scenario id")),
    responses(
        (status = 204, description = "Scenario deleted"),
        (status = 404, description = "Unknown scenario")
    )
)]
pub async fn delete_scenario_handler(
    State(app_state): State<Arc<AppState>>,
    Path(scenario_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    app_state.store.delete_scenario(scenario_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Generate up to three new scenarios for a role from templates not yet used.
#[utoipa::path(
    post,
    path = "/scenarios/generate/{role}",
    params(("role" = String, Path, description = "coach, sales, customer-service or scientist")),
    responses(
        (status = 201, description = "Scenarios generated (empty when every template is used)", body = [ScenarioDto]),
        (status = 400, description = "Unknown role")
    )
)]
pub async fn generate_scenarios_handler(
    State(app_state): State<Arc<AppState>>,
    Path(role): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let role = parse_role(&role)?;
    let names = role_scenario_names(&app_state, role).await?;

    let mut created = Vec::new();
    for scenario in catalog::generate_scenarios(role, names.as_slice()) {
        let saved = app_state.store.save_scenario(&scenario).await?;
        created.push(ScenarioDto::from(&saved));
    }
    info!(role = %role, count = created.len(), "Generated training scenarios");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Whether every template for a role already exists as a scenario (matched by name).
#[utoipa::path(
    get,
    path = "/scenarios/exhausted/{role}",
    params(("role" = String, Path, description = "coach, sales, customer-service or scientist")),
    responses(
        (status = 200, description = "Exhaustion flag", body = ExhaustedResponse),
        (status = 400, description = "Unknown role")
    )
)]
pub async fn templates_exhausted_handler(
    State(app_state): State<Arc<AppState>>,
    Path(role): Path<String>,
) -> Result<Json<ExhaustedResponse>, ApiError> {
    let role = parse_role(&role)?;
    let names = role_scenario_names(&app_state, role).await?;
    Ok(Json(ExhaustedResponse {
        role: role.as_str(),
        exhausted: catalog::all_templates_used(role, names.as_slice()),
    }))
}

async fn role_scenario_names(app_state: &AppState, role: StaffRole) -> Result<Vec<String>, ApiError> {
    Ok(app_state
        .store
        .load_scenarios()
        .await?
        .into_iter()
        .filter(|s| s.role == role)
        .map(|s| s.name)
        .collect())
}

//=========================================================================================
// Session Handlers
//=========================================================================================

/// List recorded training sessions, newest first.
#[utoipa::path(
    get,
    path = "/sessions",
    responses((status = 200, description = "All sessions", body = [SessionDto]))
)]
pub async fn list_sessions_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<SessionDto>>, ApiError> {
    let sessions = app_state.store.load_sessions().await?;
    Ok(Json(sessions.iter().map(SessionDto::from).collect()))
}

/// Delete a recorded training session.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn delete_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    app_state.store.delete_session(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Totals and average score over recorded sessions.
#[utoipa::path(
    get,
    path = "/sessions/stats",
    responses((status = 200, description = "Session statistics", body = SessionStats))
)]
pub async fn session_stats_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<SessionStats>, ApiError> {
    let sessions = app_state.store.load_sessions().await?;
    let completed = sessions.iter().filter(|s| s.ended_at.is_some()).count();
    let scores: Vec<u8> = sessions.iter().filter_map(|s| s.score).collect();
    Ok(Json(SessionStats::from_scores(sessions.len(), completed, &scores)))
}
