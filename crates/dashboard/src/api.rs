use std::sync::Arc;

use axum::{routing::put, Router};

use crate::Databases;

mod drive;

pub struct Api {
    pub dbs: Arc<Databases>,
}

pub fn router<S>(api: Arc<Api>) -> Router<S> {
    Router::new()
        .route(
            "/user/drive",
            put(drive::update_drive).fallback(drive::method_not_allowed),
        )
        .with_state(api)
}
