use std::{fs::create_dir_all, sync::Arc};

use axum::Router;
use eyre::Context;

use api::Api;
use config::Config;

pub mod api;
pub mod config;
pub mod drive;
pub mod id;
pub mod login;

pub struct Databases {
    pub login: login::Database,
}

pub fn database(config: &Config) -> eyre::Result<Databases> {
    let path = &config.database.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent).context("cannot create directory for databases")?;
    }

    let login = login::database::start(&login::database::Settings { path: path.clone() })
        .context("cannot start up login database")?;

    Ok(Databases { login })
}

pub fn router(dbs: Arc<Databases>) -> Router {
    Router::new().nest("/api", api::router(Arc::new(Api { dbs })))
}
