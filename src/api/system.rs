/// Start/stop, status and settings
use crate::{
    api::validated,
    auth::AdminAuth,
    context::AppContext,
    error::RentalResult,
    manager::PoolStats,
    settings::Settings,
};
use axum::{
    extract::State,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/admin/start", post(start))
        .route("/admin/stop", post(stop))
        .route("/admin/status", get(status))
        .route("/admin/settings", put(update_settings))
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub running: bool,
    pub auto_start: bool,
    pub admin_id: Option<String>,
    pub bindings: usize,
    pub pool: PoolStats,
}

async fn build_status(ctx: &AppContext) -> SystemStatus {
    let settings = ctx.control.settings().await;
    SystemStatus {
        running: ctx.control.is_running(),
        auto_start: settings.auto_start,
        admin_id: settings.admin_id,
        bindings: ctx.bindings.len().await,
        pool: ctx.manager.stats().await,
    }
}

async fn start(State(ctx): State<AppContext>, _auth: AdminAuth) -> RentalResult<Json<SystemStatus>> {
    ctx.control.start()?;
    Ok(Json(build_status(&ctx).await))
}

async fn stop(State(ctx): State<AppContext>, _auth: AdminAuth) -> RentalResult<Json<SystemStatus>> {
    ctx.control.stop()?;
    Ok(Json(build_status(&ctx).await))
}

async fn status(State(ctx): State<AppContext>, _auth: AdminAuth) -> Json<SystemStatus> {
    Json(build_status(&ctx).await)
}

#[derive(Debug, Deserialize, Validate)]
struct SettingsRequest {
    #[serde(default)]
    auto_start: Option<bool>,
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    admin_id: Option<String>,
}

async fn update_settings(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Json(req): Json<SettingsRequest>,
) -> RentalResult<Json<Settings>> {
    let req = validated(req)?;

    if let Some(auto_start) = req.auto_start {
        ctx.control.set_auto_start(auto_start).await?;
    }
    if let Some(admin_id) = req.admin_id {
        ctx.control.set_admin_id(&admin_id).await?;
    }

    Ok(Json(ctx.control.settings().await))
}
