use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    pub database: Database,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Server {
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Database {
    /// SQLite file holding users and sessions. `:memory:` keeps everything in memory.
    pub path: PathBuf,
}
