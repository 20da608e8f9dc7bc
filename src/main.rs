use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use toybox::headless::{demo_modules, HeadlessSession, Manifest};
use toybox::RuntimeConfig;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let manifest_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: toybox <manifest.json>")?;

    let subscriber_result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
    if subscriber_result.is_err() {
        // tracing was already initialised; continue silently
    }

    let config = RuntimeConfig::from_env().context("failed to load runtime config")?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    let local = tokio::task::LocalSet::new();

    local.block_on(&rt, async move {
        let raw = tokio::fs::read_to_string(&manifest_path)
            .await
            .with_context(|| format!("failed to read {}", manifest_path.display()))?;
        let manifest = Manifest::parse(&raw)
            .with_context(|| format!("invalid manifest {}", manifest_path.display()))?;

        let session = HeadlessSession::new(&manifest, Rc::new(demo_modules()), config)?;
        for output in session.run().await? {
            let marker = if output.warning { "!" } else { " " };
            println!("{marker} {:<12} {}", output.id, output.output);
        }
        session.runtime().teardown_all()?;
        Ok(())
    })
}
