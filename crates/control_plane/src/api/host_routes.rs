//! Host routes: registration confirm, token exchange, check-in and reports.

use crate::api::middleware::AuthenticatedHost;
use crate::api::AppState;
use crate::error::AppError;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use tracing::{debug, warn};
use weaver_types::wire::{
    CheckInRequest, CheckInResponse, ConfirmRegistrationRequest, HostCredentials,
    ManualDownload, TokenResponse, WorkStatusUpdate,
};
use weaver_types::{GameId, ServerId};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register/confirm", post(confirm_registration))
        .route("/token", post(issue_token))
        .route("/checkin", post(check_in))
        .route("/work/status", post(report_status))
        .route("/games/:id/client", get(client_download))
        .route("/servers/:id", delete(delete_server))
}

fn peer_ip(connect_info: Option<ConnectInfo<SocketAddr>>) -> Option<String> {
    connect_info.map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// POST /api/host/register/confirm
async fn confirm_registration(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<ConfirmRegistrationRequest>,
) -> Result<Json<HostCredentials>, AppError> {
    let credentials = state
        .auth
        .confirm_registration(
            request.host_id,
            &request.register_key,
            peer_ip(connect_info),
        )
        .await?;
    Ok(Json(credentials))
}

/// POST /api/host/token
async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<HostCredentials>,
) -> Result<Json<TokenResponse>, AppError> {
    let token = state
        .auth
        .issue_token(request.host_id, &request.host_token)
        .await?;
    Ok(Json(token))
}

/// POST /api/host/checkin
async fn check_in(
    State(state): State<AppState>,
    AuthenticatedHost(host_id): AuthenticatedHost,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<CheckInRequest>,
) -> Result<Json<CheckInResponse>, AppError> {
    state.auth.touch(host_id, peer_ip(connect_info)).await?;
    state.auth.record_usage(host_id, request.usage).await?;
    state
        .actions
        .record_server_states(host_id, &request.servers)
        .await?;

    let max_items = request.max_items.unwrap_or(state.queue.batch_size());
    let work = state.queue.pull_pending(host_id, max_items).await?;
    debug!("Host {} checked in, {} items pending", host_id, work.len());
    Ok(Json(CheckInResponse { work }))
}

/// POST /api/host/work/status
async fn report_status(
    State(state): State<AppState>,
    AuthenticatedHost(host_id): AuthenticatedHost,
    Json(update): Json<WorkStatusUpdate>,
) -> Result<StatusCode, AppError> {
    let owned = state
        .queue
        .get(update.work_id)
        .await?
        .map(|w| w.host_id == host_id)
        .unwrap_or(false);
    if !owned {
        warn!(
            "Host {} reported status for work {} it does not own",
            host_id, update.work_id
        );
        return Err(AppError::NotFound(format!(
            "Work item {} not found",
            update.work_id
        )));
    }

    state
        .queue
        .report_status(update.work_id, update.status, update.message)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/host/games/{id}/client
async fn client_download(
    State(state): State<AppState>,
    AuthenticatedHost(_host_id): AuthenticatedHost,
    Path(game_id): Path<GameId>,
) -> Result<Json<ManualDownload>, AppError> {
    Ok(Json(state.actions.client_download(game_id).await?))
}

/// DELETE /api/host/servers/{id}
async fn delete_server(
    State(state): State<AppState>,
    AuthenticatedHost(host_id): AuthenticatedHost,
    Path(server_id): Path<ServerId>,
) -> Result<StatusCode, AppError> {
    state.actions.delete_server(host_id, server_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
