//! # Route Subcommand
//!
//! Resolves the workflow for a document type and prints its stages in
//! routing order.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use signoff_core::DocumentTypeId;
use signoff_definition::{StageCatalog, WorkflowStage};

/// Arguments for the route subcommand.
#[derive(Args, Debug)]
pub struct RouteArgs {
    /// Workflow configuration file (YAML).
    pub file: PathBuf,
    /// Document type to route, e.g. `purchase_invoice`.
    pub document_type: String,
}

/// Run `route`, writing the route to `out`.
pub fn run(args: &RouteArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let (registry, _) = crate::load_registry(&args.file)?;
    let document_type = DocumentTypeId::new(&args.document_type)?;
    let workflow = registry.resolve(&document_type)?;
    let catalog = StageCatalog::new(workflow.id, workflow.revision, workflow.stages);

    writeln!(out, "{document_type} → {}", workflow.name)?;
    for stage in catalog.stages() {
        writeln!(out, "  {}", describe(stage))?;
    }
    Ok(())
}

fn describe(stage: &WorkflowStage) -> String {
    let mut who: Vec<String> = stage
        .assignment
        .roles
        .iter()
        .map(|r| format!("role:{}", r.as_str()))
        .collect();
    who.extend(stage.assignment.users.iter().map(|u| format!("user:{}", u.as_str())));
    let who = if who.is_empty() { "unassigned".to_string() } else { who.join(", ") };

    let mut line = format!(
        "{}. {} (quorum {}; {})",
        stage.position, stage.name, stage.approval_quorum, who
    );
    if let Some(days) = stage.timeout_days {
        line.push_str(&format!(" sla {days}d"));
    }
    if stage.is_final {
        line.push_str(" [final]");
    }
    line
}
