/// Marketplace order webhook
use crate::{
    api::validated,
    context::AppContext,
    error::{RentalError, RentalResult},
    orders::{OrderEvent, OrderOutcome},
};
use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use validator::Validate;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/orders", post(receive_order))
}

/// Either `product_name` or the raw marketplace `description` must be set
#[derive(Debug, Deserialize, Validate)]
struct OrderRequest {
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    buyer_id: String,
    #[serde(default)]
    buyer_name: String,
    #[validate(length(min = 1, max = 128))]
    order_id: String,
}

impl OrderRequest {
    fn into_event(self) -> RentalResult<OrderEvent> {
        if let Some(product_name) = self.product_name.filter(|name| !name.trim().is_empty()) {
            return Ok(OrderEvent {
                product_name: product_name.trim().to_string(),
                buyer_id: self.buyer_id.trim().to_string(),
                buyer_name: self.buyer_name.trim().to_string(),
                order_id: self.order_id.trim().to_string(),
            });
        }

        let description = self.description.ok_or_else(|| {
            RentalError::Validation("product_name or description is required".to_string())
        })?;
        OrderEvent::from_description(&description, &self.buyer_id, &self.buyer_name, &self.order_id)
            .ok_or_else(|| RentalError::Validation("Product name is empty".to_string()))
    }
}

/// Malformed payloads are errors; everything else answers 200 with the outcome
async fn receive_order(
    State(ctx): State<AppContext>,
    Json(req): Json<OrderRequest>,
) -> RentalResult<Json<OrderOutcome>> {
    let event = validated(req)?.into_event()?;
    Ok(Json(ctx.intake.handle_order(event).await))
}
