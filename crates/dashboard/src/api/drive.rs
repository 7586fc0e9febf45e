use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    drive::{DriveError, DriveUpdate},
    login,
};

use super::Api;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Acknowledged {
    pub ok: bool,
}

pub async fn method_not_allowed() -> DriveError {
    DriveError::MethodNotAllowed
}

pub async fn update_drive(
    State(api): State<Arc<Api>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Acknowledged>, DriveError> {
    let database = &api.dbs.login;

    let user_id = login::identify(database, &headers)
        .await
        .ok_or(DriveError::Unauthorized)?;
    let user = database
        .find_user(user_id)
        .await?
        .ok_or(DriveError::UserNotFound)?;

    let drive = DriveUpdate::from_json(&body).validate(user.reward_tier)?;

    if drive != user.drive {
        database.update_drive(user_id, drive).await?;
        info!(%user_id, ?drive, "drive preferences updated");
    } else {
        debug!(%user_id, "drive preferences unchanged");
    }

    Ok(Json(Acknowledged { ok: true }))
}
