/// Product binding endpoints
use crate::{
    api::validated,
    auth::AdminAuth,
    binding::{Binding, NewBinding},
    context::AppContext,
    error::{RentalError, RentalResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/admin/bindings", get(list_bindings).post(create_binding))
        .route("/admin/bindings/:id", delete(delete_binding))
        .route("/admin/bindings/unbind", post(unbind_matching))
}

#[derive(Debug, Serialize)]
struct BindingList {
    bindings: Vec<Binding>,
}

async fn list_bindings(State(ctx): State<AppContext>, _auth: AdminAuth) -> Json<BindingList> {
    Json(BindingList {
        bindings: ctx.bindings.list().await,
    })
}

async fn create_binding(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Json(req): Json<NewBinding>,
) -> RentalResult<(StatusCode, Json<Binding>)> {
    let req = validated(req)?;
    let binding = ctx
        .bindings
        .bind(&req.product_name, &req.account_type, req.duration_hours)
        .await?;
    Ok((StatusCode::CREATED, Json(binding)))
}

async fn delete_binding(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(id): Path<i64>,
) -> RentalResult<Json<Binding>> {
    Ok(Json(ctx.bindings.unbind_by_id(id).await?))
}

#[derive(Debug, Deserialize)]
struct UnbindRequest {
    query: String,
}

/// Exact name, then prefix, then substring
async fn unbind_matching(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Json(req): Json<UnbindRequest>,
) -> RentalResult<Json<Binding>> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(RentalError::Validation("Query cannot be empty".to_string()));
    }

    let found = ctx
        .bindings
        .find_for_unbind(query)
        .await
        .ok_or_else(|| RentalError::NotFound(format!("Binding matching {}", query)))?;
    Ok(Json(ctx.bindings.unbind_by_id(found.id).await?))
}
