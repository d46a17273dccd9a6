//! Run command - execute one tool through the broker.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use quiver_broker::{Approver, Invocation, ToolBroker};
use quiver_config::Config;
use quiver_package::load_package;
use serde_json::Value;
use tracing::warn;

use crate::approval_handler::{AutoApprover, TerminalApprover};
use crate::theme::Theme;

/// Run `tool` from the package in `dir` with `args`, printing the envelope.
///
/// The external boundary is rooted at the current directory unless the
/// configuration names a root.
pub(crate) async fn run(
    dir: &Path,
    tool: &str,
    args: &str,
    yes: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let arguments: Value = serde_json::from_str(args).context("--args is not valid JSON")?;
    let package = Arc::new(load_package(dir)?);
    let cwd = std::env::current_dir().context("cannot determine the current directory")?;

    let mut builder = ToolBroker::from_config(config, &cwd)?;
    let approver: Option<Arc<dyn Approver>> = if yes {
        Some(Arc::new(AutoApprover))
    } else {
        TerminalApprover::if_interactive().map(|a| Arc::new(a) as Arc<dyn Approver>)
    };
    if let Some(approver) = approver {
        builder = builder.approver(approver);
    }
    let broker = builder.build()?;

    let result = broker.execute(Invocation::new(package, tool, arguments)).await;
    if let Err(e) = broker.audit().flush() {
        warn!(error = %e, "failed to flush audit log");
    }

    println!("{}", serde_json::to_string_pretty(&result.to_value())?);
    if let Some(error) = result.error() {
        eprintln!("{}", Theme::failure(error.kind.as_str(), &error.message));
        bail!("tool failed");
    }
    Ok(())
}
