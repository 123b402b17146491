//! Binary entrypoint for the MApp API server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use mapp_runtime::{build_dispatcher, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env();
    let spec_path: PathBuf = config
        .spec_file
        .clone()
        .or_else(|| std::env::args().nth(1).map(PathBuf::from))
        .context("no spec file: set MAPP_SPEC_FILE or pass a path")?;

    let spec = mapp_spec::load_normalized(&spec_path, true)?;
    tracing::info!(project = %spec.project.name.snake, "spec loaded");

    let dispatcher = Arc::new(build_dispatcher(spec, &config)?);
    let addr = format!("0.0.0.0:{}", config.server_port);
    mapp_server::run(&addr, dispatcher).await;
    Ok(())
}
