/// Rental endpoints: listing, manual checkout, extension and return
use crate::{
    api::validated,
    auth::AdminAuth,
    context::AppContext,
    error::{RentalError, RentalResult},
    manager::{Checkout, CheckoutRequest, Reclaimed},
    rental::{Rental, MAX_RENTAL_HOURS},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/admin/rentals", get(list_rentals).post(checkout))
        .route("/admin/rentals/:id", get(get_rental))
        .route("/admin/rentals/:id/extend", post(extend_rental))
        .route("/admin/rentals/:id/return", post(return_rental))
}

#[derive(Debug, Deserialize)]
struct ListRentalsQuery {
    #[serde(default)]
    active: bool,
}

#[derive(Debug, Serialize)]
struct RentalList {
    rentals: Vec<Rental>,
}

async fn list_rentals(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Query(query): Query<ListRentalsQuery>,
) -> Json<RentalList> {
    Json(RentalList {
        rentals: ctx.manager.list_rentals(query.active).await,
    })
}

async fn get_rental(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(id): Path<String>,
) -> RentalResult<Json<Rental>> {
    ctx.manager
        .get_rental(&id)
        .await
        .map(Json)
        .ok_or_else(|| RentalError::NotFound(format!("Rental {}", id)))
}

#[derive(Debug, Deserialize, Validate)]
struct CheckoutBody {
    #[validate(length(min = 1, max = 128))]
    requester_id: String,
    #[validate(length(min = 1, max = 128))]
    requester_name: String,
    #[validate(range(min = 1, max = MAX_RENTAL_HOURS))]
    duration_hours: i64,
    #[serde(default)]
    account_type: Option<String>,
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    specific_account: Option<String>,
}

async fn checkout(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Json(body): Json<CheckoutBody>,
) -> RentalResult<(StatusCode, Json<Checkout>)> {
    let body = validated(body)?;
    let checkout = ctx
        .manager
        .checkout(CheckoutRequest {
            requester_id: body.requester_id,
            requester_name: body.requester_name,
            duration_hours: body.duration_hours,
            account_type: body.account_type,
            order_id: body.order_id,
            specific_account: body.specific_account,
        })
        .await?;

    ctx.notifier
        .on_checkout_success(&checkout.account, &checkout.rental)
        .await;
    Ok((StatusCode::CREATED, Json(checkout)))
}

#[derive(Debug, Deserialize, Validate)]
struct ExtendBody {
    #[validate(range(min = 1, max = MAX_RENTAL_HOURS))]
    additional_hours: i64,
}

async fn extend_rental(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(id): Path<String>,
    Json(body): Json<ExtendBody>,
) -> RentalResult<Json<Rental>> {
    let body = validated(body)?;
    Ok(Json(ctx.manager.extend(&id, body.additional_hours).await?))
}

async fn return_rental(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(id): Path<String>,
) -> RentalResult<Json<Reclaimed>> {
    let reclaimed = ctx.manager.return_rental(&id).await?;
    ctx.notifier
        .on_reclaim(
            &reclaimed.rental,
            &reclaimed.account,
            &reclaimed.new_password,
            reclaimed.reason,
        )
        .await;
    Ok(Json(reclaimed))
}
