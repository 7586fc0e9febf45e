use std::{net::Ipv4Addr, sync::Arc};

use dashboard::{config::Config, database, router};
use eyre::Context;
use tokio::{fs, net::TcpListener};
use tracing::info;

async fn fallible_main() -> eyre::Result<()> {
    let config_path = std::env::var("DASHBOARD_CONFIG").unwrap_or("dashboard.toml".into());
    let config: Config = toml::from_str(
        &fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("cannot read config file {config_path}"))?,
    )
    .context("cannot deserialize config file")?;

    let dbs = Arc::new(database(&config)?);
    let app = router(dbs);

    let port: u16 = match std::env::var("DASHBOARD_PORT") {
        Ok(port) => port.parse().context("failed to parse DASHBOARD_PORT")?,
        Err(_) => config.server.port,
    };

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .context("cannot bind to port")?;
    info!("listening on port {port}");
    axum::serve(listener, app).await.context("cannot serve app")?;

    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt().init();

    fallible_main().await
}
