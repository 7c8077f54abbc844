/// Wizard endpoints for the chat bridge
use crate::{
    auth::AdminAuth,
    context::AppContext,
    error::RentalResult,
    wizard::{WizardKind, WizardReply},
};
use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/admin/conversations/:id/start", post(start_wizard))
        .route("/admin/conversations/:id/input", post(wizard_input))
}

async fn start_wizard(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(id): Path<String>,
    Json(kind): Json<WizardKind>,
) -> RentalResult<Json<WizardReply>> {
    Ok(Json(ctx.wizards.start(&id, kind).await?))
}

#[derive(Debug, Deserialize)]
struct InputBody {
    text: String,
}

async fn wizard_input(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(id): Path<String>,
    Json(req): Json<InputBody>,
) -> RentalResult<Json<WizardReply>> {
    Ok(Json(ctx.wizards.handle_input(&id, &req.text).await?))
}
