/// Account administration endpoints
use crate::{
    account::{Account, AccountInfo, AccountUpdate, NewAccount},
    api::validated,
    auth::AdminAuth,
    context::AppContext,
    error::{RentalError, RentalResult},
    manager::{PasswordReset, Reclaimed},
    provider::ProviderOutcome,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/admin/accounts", get(list_accounts).post(add_account))
        .route(
            "/admin/accounts/:login",
            get(get_account).patch(update_account).delete(remove_account),
        )
        .route("/admin/accounts/:login/reset-password", post(reset_password))
        .route("/admin/accounts/:login/rotate-password", post(rotate_password))
        .route("/admin/accounts/:login/revoke-sessions", post(revoke_sessions))
        .route("/admin/accounts/:login/force-reclaim", post(force_reclaim))
        .route("/admin/accounts/:login/disable", post(disable_account))
        .route("/admin/accounts/:login/enable", post(enable_account))
}

#[derive(Debug, Serialize)]
struct AccountList {
    accounts: Vec<Account>,
}

async fn list_accounts(State(ctx): State<AppContext>, _auth: AdminAuth) -> Json<AccountList> {
    Json(AccountList {
        accounts: ctx.manager.list_accounts().await,
    })
}

#[derive(Debug, Deserialize, Validate)]
struct AddAccountRequest {
    #[validate(length(min = 1, max = 128))]
    login: String,
    #[validate(length(min = 1, max = 256))]
    password: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    account_type: Option<String>,
    #[serde(default)]
    #[validate(length(max = 1024))]
    provider_credential: Option<String>,
}

async fn add_account(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Json(req): Json<AddAccountRequest>,
) -> RentalResult<(StatusCode, Json<Account>)> {
    let req = validated(req)?;
    let account = ctx
        .manager
        .add_account(NewAccount {
            login: req.login,
            password: req.password,
            account_type: req.account_type.unwrap_or_else(|| "standard".to_string()),
            provider_credential: req.provider_credential.filter(|c| !c.trim().is_empty()),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(account)))
}

async fn get_account(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(login): Path<String>,
) -> RentalResult<Json<AccountInfo>> {
    Ok(Json(ctx.manager.get_account_info(&login).await?))
}

async fn update_account(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(login): Path<String>,
    Json(update): Json<AccountUpdate>,
) -> RentalResult<Json<Account>> {
    let update = validated(update)?;
    Ok(Json(ctx.manager.update_account(&login, update).await?))
}

async fn remove_account(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(login): Path<String>,
) -> RentalResult<Json<Account>> {
    Ok(Json(ctx.manager.remove_account(&login).await?))
}

async fn reset_password(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(login): Path<String>,
) -> RentalResult<Json<PasswordReset>> {
    Ok(Json(ctx.manager.reset_to_original(&login).await?))
}

#[derive(Debug, Default, Deserialize)]
struct RotateRequest {
    #[serde(default)]
    new_password: Option<String>,
}

async fn rotate_password(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(login): Path<String>,
    body: Option<Json<RotateRequest>>,
) -> RentalResult<Json<PasswordReset>> {
    let new_password = body.and_then(|Json(req)| req.new_password);
    if matches!(&new_password, Some(p) if p.trim().is_empty()) {
        return Err(RentalError::Validation("Password cannot be empty".to_string()));
    }

    Ok(Json(ctx.manager.rotate_password(&login, new_password).await?))
}

async fn revoke_sessions(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(login): Path<String>,
) -> RentalResult<Json<ProviderOutcome>> {
    Ok(Json(ctx.manager.revoke_sessions(&login).await?))
}

async fn force_reclaim(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(login): Path<String>,
) -> RentalResult<Json<Reclaimed>> {
    let reclaimed = ctx.manager.force_reclaim(&login).await?;
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

async fn disable_account(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(login): Path<String>,
) -> RentalResult<Json<Account>> {
    Ok(Json(ctx.manager.set_disabled(&login, true).await?))
}

async fn enable_account(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Path(login): Path<String>,
) -> RentalResult<Json<Account>> {
    Ok(Json(ctx.manager.set_disabled(&login, false).await?))
}
