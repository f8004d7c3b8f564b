//! Operator routes: registration links, server actions, profiles and hosts.

use crate::api::middleware::Operator;
use crate::api::AppState;
use crate::error::AppError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use weaver_types::wire::{
    ActionRequest, EnqueuedWork, RegistrationRequest, RegistrationTicket, ResourceUsage,
};
use weaver_types::{
    ConfigurationItem, Host, HostId, ItemId, ItemIdentity, ProfileItem, ProfileLayer, ServerId,
    WeaverWork,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/registrations", post(create_registration))
        .route("/servers/:id/:action", post(server_action))
        .route("/server-profiles/:id", get(server_profile))
        .route(
            "/server-profiles/:id/:resource",
            put(upsert_item).delete(remove_override),
        )
        .route("/hosts/:id", get(host_status).delete(decommission_host))
        .route("/hosts/:id/maintenance", post(installer_maintenance))
        .route("/hosts/:id/work", get(host_work))
}

/// POST /api/admin/registrations
async fn create_registration(
    State(state): State<AppState>,
    _operator: Operator,
    Json(request): Json<RegistrationRequest>,
) -> Result<Json<RegistrationTicket>, AppError> {
    let ticket = state
        .auth
        .request_registration(request.account_id, &request.description)
        .await?;
    Ok(Json(ticket))
}

/// POST /api/admin/servers/{id}/{action}
async fn server_action(
    State(state): State<AppState>,
    _operator: Operator,
    Path((server_id, action)): Path<(ServerId, String)>,
    body: Option<Json<ActionRequest>>,
) -> Result<Json<EnqueuedWork>, AppError> {
    let validate = body.map(|Json(b)| b.validate).unwrap_or(false);
    let work_id = state
        .actions
        .dispatch_named(server_id, &action, validate)
        .await?;
    Ok(Json(EnqueuedWork { work_id }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolvedResourceView {
    name: String,
    declared_in: ProfileLayer,
    items: Vec<ProfileItem>,
}

/// GET /api/admin/server-profiles/{id}
async fn server_profile(
    State(state): State<AppState>,
    _operator: Operator,
    Path(server_id): Path<ServerId>,
) -> Result<Json<Vec<ResolvedResourceView>>, AppError> {
    let resolved = state.profiles.resolve_server(server_id).await?;
    Ok(Json(
        resolved
            .into_iter()
            .map(|r| ResolvedResourceView {
                name: r.resource.name,
                declared_in: r.declared_in,
                items: r.items,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemRequest {
    key: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    friendly_name: String,
    #[serde(default)]
    duplicate_key: bool,
    #[serde(default)]
    ignore: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredItem {
    item_id: ItemId,
}

/// PUT /api/admin/server-profiles/{id}/{resource}
async fn upsert_item(
    State(state): State<AppState>,
    _operator: Operator,
    Path((server_id, resource)): Path<(ServerId, String)>,
    Json(request): Json<ItemRequest>,
) -> Result<Json<StoredItem>, AppError> {
    let item = ConfigurationItem {
        friendly_name: request.friendly_name,
        duplicate_key: request.duplicate_key,
        ignore: request.ignore,
        ..ConfigurationItem::new(request.key, request.value)
            .with_category(request.category)
            .with_path(request.path)
    };
    let item_id = state.profiles.upsert_item(server_id, &resource, item).await?;
    Ok(Json(StoredItem { item_id }))
}

#[derive(Debug, Deserialize)]
struct IdentityRequest {
    key: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    path: String,
}

/// DELETE /api/admin/server-profiles/{id}/{resource}
async fn remove_override(
    State(state): State<AppState>,
    _operator: Operator,
    Path((server_id, resource)): Path<(ServerId, String)>,
    Json(request): Json<IdentityRequest>,
) -> Result<StatusCode, AppError> {
    let identity = ItemIdentity {
        category: request.category,
        key: request.key,
        path: request.path,
    };
    if state
        .profiles
        .remove_override(server_id, &resource, &identity)
        .await?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!(
            "No override for '{}' on resource '{}'",
            identity.key, resource
        )))
    }
}

#[derive(Debug, Serialize)]
struct HostStatus {
    host: Host,
    usage: Option<ResourceUsage>,
}

/// GET /api/admin/hosts/{id}
async fn host_status(
    State(state): State<AppState>,
    _operator: Operator,
    Path(host_id): Path<HostId>,
) -> Result<Json<HostStatus>, AppError> {
    let host = state.auth.host(host_id).await?;
    let usage = state.auth.latest_usage(host_id).await?;
    Ok(Json(HostStatus { host, usage }))
}

/// DELETE /api/admin/hosts/{id}
async fn decommission_host(
    State(state): State<AppState>,
    _operator: Operator,
    Path(host_id): Path<HostId>,
) -> Result<StatusCode, AppError> {
    state.auth.decommission(host_id).await?;
    let dropped = state.queue.purge_host(host_id).await?;
    info!("Decommissioned host {} ({} work items dropped)", host_id, dropped);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/hosts/{id}/maintenance
async fn installer_maintenance(
    State(state): State<AppState>,
    _operator: Operator,
    Path(host_id): Path<HostId>,
) -> Result<Json<EnqueuedWork>, AppError> {
    let work_id = state.actions.installer_maintenance(host_id).await?;
    Ok(Json(EnqueuedWork { work_id }))
}

/// GET /api/admin/hosts/{id}/work
async fn host_work(
    State(state): State<AppState>,
    _operator: Operator,
    Path(host_id): Path<HostId>,
) -> Result<Json<Vec<WeaverWork>>, AppError> {
    Ok(Json(state.queue.list_for_host(host_id).await?))
}
