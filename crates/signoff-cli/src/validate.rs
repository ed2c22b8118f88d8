//! # Validate Subcommand
//!
//! Loads a workflow configuration and prints one summary line per workflow.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;

/// Arguments for the validate subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Workflow configuration file (YAML).
    pub file: PathBuf,
}

/// Run `validate`, writing the summary to `out`.
pub fn run(args: &ValidateArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let (_, workflows) = crate::load_registry(&args.file)?;
    for workflow in &workflows {
        let applicability: Vec<&str> = workflow.applicability.iter().map(|t| t.as_str()).collect();
        writeln!(
            out,
            "{}: {} stage(s), {}, applies to [{}]",
            workflow.name,
            workflow.stages.len(),
            if workflow.is_active { "active" } else { "inactive" },
            applicability.join(", ")
        )?;
    }
    writeln!(out, "OK: {} workflow(s) valid", workflows.len())?;
    tracing::debug!(file = %args.file.display(), workflows = workflows.len(), "configuration valid");
    Ok(())
}
