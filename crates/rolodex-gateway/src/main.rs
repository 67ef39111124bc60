//! Rolodex gateway server binary.

use tracing_subscriber::EnvFilter;

use rolodex_gateway::{GatewayConfig, GatewayError, start};

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env();
    tracing::info!(
        data_dir = %config.data_dir.display(),
        "Starting Rolodex gateway"
    );

    start(config).await
}
