/// API routes and handlers
pub mod accounts;
pub mod bindings;
pub mod conversations;
pub mod health;
pub mod middleware;
pub mod orders;
pub mod rentals;
pub mod system;
pub mod templates;

use crate::{
    context::AppContext,
    error::{RentalError, RentalResult},
};
use axum::Router;
use validator::Validate;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(orders::routes())
        .merge(system::routes())
        .merge(accounts::routes())
        .merge(rentals::routes())
        .merge(bindings::routes())
        .merge(templates::routes())
        .merge(conversations::routes())
}

/// Run `validator` rules on a request body
pub(crate) fn validated<T: Validate>(req: T) -> RentalResult<T> {
    req.validate()
        .map_err(|e| RentalError::Validation(e.to_string()))?;
    Ok(req)
}
