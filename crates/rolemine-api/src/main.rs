use rolemine_api::Server;
use rolemine_core::Settings;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_dir = std::env::var("ROLEMINE_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let settings = Settings::load(Path::new(&config_dir))?;
    settings.validate()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server = Server::new(settings)?;
    server.run().await?;
    Ok(())
}
