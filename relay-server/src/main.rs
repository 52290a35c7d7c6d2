use anyhow::Result;
use relay_server::settings::{default_config, ServerSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = default_config();
    let loaded = config.load_env("RELAY__");
    tracing::debug!(loaded, "configuration loaded from environment");

    let settings = ServerSettings::from_snapshot(&config.snapshot())?;
    let addr = settings.addr();

    let ax = relay_server::build(&settings).await?;
    ax.listen(addr).await?;

    Ok(())
}
