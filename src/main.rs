use anyhow::Result;
use liftlog::cli::run_cli;
use tracing::error;

fn main() -> Result<()> {
    // Sessions are driven by one cooperative thread, nothing in them is mutated in parallel.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_cli()).inspect_err(|e| {
        error!("Error running cli {e:?}");
    })?;
    Ok(())
}
