//! Outlet CLI binary.
//!
//! Usage:
//!   outlet init
//!   outlet submit batch.json
//!   outlet run
//!   outlet status

use outlet_core::infrastructure::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("outlet_core=info".parse()?))
        .init();

    cli::run().await
}
