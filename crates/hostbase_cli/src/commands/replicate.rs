//! Replicate command implementation.

use super::require_document;
use clap::Args;
use hostbase_backend::{FileBackend, IdSelection};
use hostbase_sync::{
    BackendReplicator, ProgressObserver, ProgressSnapshot, ReplicationReport, ReplicationScope,
    ReplicatorOptions,
};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments of `hostbase replicate`.
#[derive(Args, Debug)]
pub struct ReplicateArgs {
    /// Backend document to read from
    #[arg(long)]
    pub from: PathBuf,

    /// Backend document to write to
    #[arg(long)]
    pub to: PathBuf,

    /// Config server to copy (repeatable, `none` for none)
    #[arg(long = "server", value_name = "ID")]
    pub servers: Vec<String>,

    /// Depot to copy (repeatable, `none` for none)
    #[arg(long = "depot", value_name = "ID")]
    pub depots: Vec<String>,

    /// Client to copy (repeatable, `none` for none)
    #[arg(long = "client", value_name = "ID")]
    pub clients: Vec<String>,

    /// Group to copy (repeatable, `none` for none)
    #[arg(long = "group", value_name = "ID")]
    pub groups: Vec<String>,

    /// Product to copy (repeatable, `none` for none)
    #[arg(long = "product", value_name = "ID")]
    pub products: Vec<String>,

    /// Skip software and hardware inventory
    #[arg(long)]
    pub no_audit: bool,

    /// Copy license records too
    #[arg(long)]
    pub licenses: bool,

    /// Abort on the first failed write
    #[arg(long)]
    pub strict: bool,

    /// Keep the destination's records instead of wiping it first
    #[arg(long)]
    pub keep_existing: bool,

    /// Rename the config server to this id after copying
    #[arg(long, value_name = "ID")]
    pub new_server_id: Option<String>,
}

/// Turns repeated id flags into a selection: no flag selects every id,
/// `none` selects no id.
pub fn selection(ids: &[String]) -> IdSelection {
    if ids.is_empty() {
        IdSelection::All
    } else if ids.iter().any(|id| id.eq_ignore_ascii_case("none")) {
        IdSelection::None
    } else {
        IdSelection::exactly(ids.iter().map(|id| id.to_lowercase()))
    }
}

impl ReplicateArgs {
    /// Returns the scope the flags describe.
    pub fn scope(&self) -> ReplicationScope {
        ReplicationScope::new()
            .with_servers(selection(&self.servers))
            .with_depots(selection(&self.depots))
            .with_clients(selection(&self.clients))
            .with_groups(selection(&self.groups))
            .with_products(selection(&self.products))
            .with_audit(!self.no_audit)
            .with_licenses(self.licenses)
    }

    /// Returns the replicator options the flags describe.
    pub fn options(&self) -> ReplicatorOptions {
        let options = ReplicatorOptions::new()
            .with_cleanup_first(!self.keep_existing)
            .with_strict(self.strict);
        match &self.new_server_id {
            Some(id) => options.with_new_server_id(id),
            None => options,
        }
    }
}

struct LogProgress;

impl ProgressObserver for LogProgress {
    fn progress_changed(&self, snapshot: &ProgressSnapshot) {
        tracing::debug!(
            title = %snapshot.title,
            percent = snapshot.percent(),
            "{}",
            snapshot.message
        );
    }
}

/// Runs the replicate command.
pub fn run(args: &ReplicateArgs) -> Result<ReplicationReport, Box<dyn std::error::Error>> {
    require_document(&args.from)?;
    let source = Arc::new(FileBackend::open(&args.from)?);
    let destination = Arc::new(FileBackend::open_with_create_dirs(&args.to)?);

    let replicator = BackendReplicator::new(source, destination, args.options());
    replicator.overall_progress().attach(Arc::new(LogProgress));
    let report = replicator.replicate(&args.scope())?;
    tracing::info!(
        from = %args.from.display(),
        to = %args.to.display(),
        written = report.written(),
        failed = report.failed(),
        "replication finished"
    );
    Ok(report)
}

/// Renders a report as a table.
pub fn render_report(report: &ReplicationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<32} {:>8} {:>8} {:>8}", "Class", "Read", "Written", "Failed");
    for (class, counts) in &report.classes {
        let _ = writeln!(
            out,
            "{:<32} {:>8} {:>8} {:>8}",
            class.to_string(),
            counts.read,
            counts.written,
            counts.failed
        );
    }
    let _ = writeln!(out, "Total written: {}, failed: {}", report.written(), report.failed());
    if let Some((old, new)) = &report.renamed {
        let _ = writeln!(out, "Renamed config server {old} to {new}");
    }
    if !report.unplaceable_groups.is_empty() {
        let _ = writeln!(out, "Unplaceable groups: {}", report.unplaceable_groups.join(", "));
    }
    out
}
