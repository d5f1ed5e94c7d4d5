//! Per-user experience balance.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::UserId;
use serde::Serialize;
use store::Store;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct XpResponse {
    pub user_id: UserId,
    pub balance: i64,
}

/// GET /users/:id/xp — sum of the user's ledger credits.
#[tracing::instrument(skip(state))]
pub async fn xp<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<XpResponse>, ApiError> {
    let user_id: UserId = parse_id(&id, "user")?;
    let balance = state.service.xp_balance(user_id).await?;
    Ok(Json(XpResponse { user_id, balance }))
}
