use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::error::{Result, ServiceError};
use crate::health::HealthChecker;
use crate::model::{Config, ConfigGroup, LabeledConfig};
use crate::repository::{ConfigRepository, GroupRepository};
use crate::response::DeletedResponse;
use crate::store::KvStore;
use crate::validation::{parse_label_query, RequestValidator};

/// Application state shared by the domain handlers
#[derive(Clone)]
pub struct AppState {
    pub configs: ConfigRepository,
    pub groups: GroupRepository,
    pub health: HealthChecker,
}

impl AppState {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            configs: ConfigRepository::new(Arc::clone(&store)),
            groups: GroupRepository::new(Arc::clone(&store)),
            health: HealthChecker::new(store),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveConfigRequest {
    pub config_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LabelQuery {
    pub labels: Option<String>,
}

fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ServiceError::InvalidRequest(rejection.body_text()))
}

/// Create a configuration
pub async fn create_config(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Config>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let mut config = json_body(payload)?;
    RequestValidator::validate_config(&config)?;

    config.assign_id();
    state.configs.create(&config).await?;

    info!(name = %config.name, version = %config.version, id = %config.id, "Created configuration");
    Ok((StatusCode::CREATED, Json(config)))
}

/// Get a configuration by name and version
pub async fn get_config(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, String)>,
) -> Result<Json<Config>> {
    RequestValidator::validate_path(&name, &version)?;
    Ok(Json(state.configs.get(&name, &version).await?))
}

/// Delete a configuration by name and version
pub async fn delete_config(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, String)>,
) -> Result<StatusCode> {
    RequestValidator::validate_path(&name, &version)?;
    state.configs.delete(&name, &version).await?;

    info!(name = %name, version = %version, "Deleted configuration");
    Ok(StatusCode::NO_CONTENT)
}

/// Create a configuration group
pub async fn create_group(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ConfigGroup>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let mut group = json_body(payload)?;
    RequestValidator::validate_group(&group)?;

    group.ensure_ids();
    state.groups.create(&group).await?;

    info!(name = %group.name, version = %group.version, id = %group.id, "Created configuration group");
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, String)>,
) -> Result<Json<ConfigGroup>> {
    RequestValidator::validate_path(&name, &version)?;
    Ok(Json(state.groups.get(&name, &version).await?))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, String)>,
) -> Result<StatusCode> {
    RequestValidator::validate_path(&name, &version)?;
    state.groups.delete(&name, &version).await?;

    info!(name = %name, version = %version, "Deleted configuration group");
    Ok(StatusCode::NO_CONTENT)
}

/// Add a labeled configuration to a group
pub async fn add_config_to_group(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, String)>,
    payload: std::result::Result<Json<LabeledConfig>, JsonRejection>,
) -> Result<Json<ConfigGroup>> {
    RequestValidator::validate_path(&name, &version)?;
    let entry = json_body(payload)?;
    RequestValidator::validate_labeled(&entry)?;

    let mut group = state.groups.get(&name, &version).await?;
    let described = format!(
        "configuration {}/{} in group {}/{}",
        entry.configuration.name, entry.configuration.version, name, version
    );
    if !group.add_config(entry) {
        return Err(ServiceError::AlreadyExists(described));
    }
    state.groups.update(&group).await?;

    info!(group = %name, version = %version, "Added configuration to group");
    Ok(Json(group))
}

/// Remove a configuration from a group by entry id
pub async fn remove_config_from_group(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, String)>,
    payload: std::result::Result<Json<RemoveConfigRequest>, JsonRejection>,
) -> Result<Json<ConfigGroup>> {
    RequestValidator::validate_path(&name, &version)?;
    let request = json_body(payload)?;

    let mut group = state.groups.get(&name, &version).await?;
    if !group.remove_config(&request.config_id) {
        return Err(ServiceError::NotFound(format!(
            "configuration {} in group {}/{}",
            request.config_id, name, version
        )));
    }
    state.groups.update(&group).await?;

    info!(group = %name, version = %version, config_id = %request.config_id, "Removed configuration from group");
    Ok(Json(group))
}

/// List group configurations carrying every requested label
pub async fn get_configs_by_labels(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, String)>,
    Query(query): Query<LabelQuery>,
) -> Result<Json<Vec<LabeledConfig>>> {
    RequestValidator::validate_path(&name, &version)?;
    let labels = parse_label_query(query.labels.as_deref())?;

    let group = state.groups.get(&name, &version).await?;
    Ok(Json(group.configs_matching(&labels)))
}

/// Remove every group configuration carrying all requested labels
pub async fn delete_configs_by_labels(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, String)>,
    Query(query): Query<LabelQuery>,
) -> Result<Json<DeletedResponse>> {
    RequestValidator::validate_path(&name, &version)?;
    let labels = parse_label_query(query.labels.as_deref())?;
    if labels.is_empty() {
        return Err(ServiceError::InvalidRequest(
            "labels query param is required".to_string(),
        ));
    }

    let mut group = state.groups.get(&name, &version).await?;
    let deleted = group.remove_matching(&labels);
    state.groups.update(&group).await?;

    info!(group = %name, version = %version, deleted, "Deleted configurations by labels");
    Ok(Json(DeletedResponse { deleted }))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health.check_health().await)
}
