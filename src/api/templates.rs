/// Message template endpoints
use crate::{
    auth::AdminAuth,
    context::AppContext,
    error::RentalResult,
    notify::TemplateView,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/admin/templates", get(list_templates))
        .route("/admin/templates/reset", post(reset_templates))
        .route("/admin/templates/:name", put(set_template))
}

#[derive(Debug, Serialize)]
struct TemplateList {
    templates: Vec<TemplateView>,
}

async fn list_templates(State(ctx): State<AppContext>, _auth: AdminAuth) -> Json<TemplateList> {
    Json(TemplateList {
        templates: ctx.templates.list().await,
    })
}

#[derive(Debug, Deserialize)]
struct TemplateBody {
    body: String,
}

async fn set_template(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(name): Path<String>,
    Json(req): Json<TemplateBody>,
) -> RentalResult<Json<TemplateView>> {
    ctx.templates.set(&name, &req.body).await?;
    Ok(Json(TemplateView {
        body: ctx.templates.get(&name).await?,
        name,
        is_custom: true,
    }))
}

async fn reset_templates(State(ctx): State<AppContext>, _auth: AdminAuth) -> RentalResult<StatusCode> {
    ctx.templates.reset().await?;
    Ok(StatusCode::NO_CONTENT)
}
