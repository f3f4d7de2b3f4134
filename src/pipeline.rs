// src/pipeline.rs

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

use crate::aggregate::{Aggregate, aggregate};
use crate::export::{ExportError, save_csv};
use crate::heuristics::{Category, ExtractionStats, LineExtractor};
use crate::ledger_db::{LedgerStore, RunRecord, StoreError};
use crate::reconcile::{LedgerRow, Period, ReconcilePolicy, format_cents, reconcile};
use crate::resolver::NameResolver;
use crate::roster::RosterRegistry;
use crate::source::{DocumentSource, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    SourceUnavailable(#[from] SourceError),

    #[error("extraction worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// What happened to one of the two reports.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryReport {
    pub category: Category,
    pub source: String,
    pub pages: usize,
    pub stats: ExtractionStats,
    pub people: usize,
    pub total_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub period: Period,
    pub roster_version: String,
    pub parts: CategoryReport,
    pub services: CategoryReport,
    pub rows: Vec<LedgerRow>,
}

impl RunReport {
    pub fn run_record(&self) -> RunRecord {
        RunRecord {
            period: self.period,
            roster_version: self.roster_version.clone(),
            parts_resolved: self.parts.stats.resolved,
            parts_skipped: self.parts.stats.skipped(),
            services_resolved: self.services.stats.resolved,
            services_skipped: self.services.stats.skipped(),
        }
    }
}

/// Read one report and sum its figures per roster identity.
pub fn extract_document(
    category: Category,
    source: &dyn DocumentSource,
    resolver: &NameResolver,
) -> Result<(Aggregate, CategoryReport), SourceError> {
    let description = source.describe();
    let span = info_span!("document", category = ?category, source = %description);
    let _guard = span.enter();

    let pages: Vec<String> = source.pages()?.collect();
    let extraction =
        LineExtractor::new(category, resolver).extract(pages.iter().flat_map(|p| p.lines()));
    for obs in &extraction.observations {
        debug!(
            identity = %obs.identity,
            raw = %obs.raw_name,
            cents = obs.amount_cents,
            line = %obs.source_line,
            "Observation"
        );
    }
    let totals = aggregate(&extraction.observations);

    let stats = extraction.stats;
    info!(
        pages = pages.len(),
        lines = stats.lines,
        resolved = stats.resolved,
        no_match = stats.no_match,
        unresolved = stats.unresolved,
        ambiguous = stats.ambiguous,
        amount_invalid = stats.amount_invalid,
        people = totals.len(),
        total = %format_cents(totals.total_cents()),
        "Document processed"
    );
    if totals.is_empty() {
        warn!("No figures found; document contributes nothing to the ledger");
    }
    for (identity, cents) in totals.iter() {
        debug!(
            identity,
            lines = totals.line_count(identity),
            total = %format_cents(cents),
            "Identity total"
        );
    }

    let report = CategoryReport {
        category,
        source: description,
        pages: pages.len(),
        stats,
        people: totals.len(),
        total_cents: totals.total_cents(),
    };
    Ok((totals, report))
}

/// Run both reports through extraction concurrently, then reconcile.
///
/// Fails only when a document cannot be opened at all; nothing is persisted
/// here.
pub async fn process(
    parts: Box<dyn DocumentSource>,
    services: Box<dyn DocumentSource>,
    roster: Arc<RosterRegistry>,
    period: Period,
    policy: ReconcilePolicy,
) -> Result<RunReport, PipelineError> {
    let resolver = NameResolver::new(Arc::clone(&roster));

    let parts_task = {
        let resolver = resolver.clone();
        tokio::task::spawn_blocking(move || {
            extract_document(Category::Parts, parts.as_ref(), &resolver)
        })
    };
    let services_task = tokio::task::spawn_blocking(move || {
        extract_document(Category::Services, services.as_ref(), &resolver)
    });

    let (parts_done, services_done) = tokio::join!(parts_task, services_task);
    let (parts_totals, parts) = parts_done??;
    let (services_totals, services) = services_done??;

    let rows = reconcile(&parts_totals, &services_totals, period, &roster, policy);
    info!(period = %period, rows = rows.len(), fill_roster = policy.fill_roster, "Reconciled");

    Ok(RunReport {
        period,
        roster_version: roster.version(),
        parts,
        services,
        rows,
    })
}

#[derive(Debug)]
pub enum PersistOutcome {
    /// Rows are in the ledger; `run_id` is `None` when only the audit record
    /// failed.
    Stored { rows: usize, run_id: Option<i64> },
    /// The store failed; rows were written to a local CSV instead.
    Fallback { path: PathBuf, error: StoreError },
}

pub fn fallback_path(dir: &Path, period: Period) -> PathBuf {
    dir.join(format!(
        "comissao_{}_{:02}.csv",
        period.year,
        period.month.number()
    ))
}

/// Upsert the run's rows and audit record. A store failure never loses
/// the computed rows: they go to `fallback_dir` as CSV.
pub fn persist<S: LedgerStore + ?Sized>(
    report: &RunReport,
    store: &S,
    fallback_dir: &Path,
) -> Result<PersistOutcome, ExportError> {
    let rows = match store.upsert(&report.rows) {
        Ok(rows) => rows,
        Err(e) => return fallback(report, fallback_dir, e),
    };

    let run_id = match store.record_run(&report.run_record()) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(error = %e, rows, "Rows stored but the run audit record failed");
            None
        }
    };
    Ok(PersistOutcome::Stored { rows, run_id })
}

/// Write the rows locally after the ledger store could not take them.
pub fn fallback(
    report: &RunReport,
    fallback_dir: &Path,
    error: StoreError,
) -> Result<PersistOutcome, ExportError> {
    error!(error = %error, "Ledger store unavailable; writing local fallback");
    let path = fallback_path(fallback_dir, report.period);
    save_csv(&path, &report.rows)?;
    Ok(PersistOutcome::Fallback { path, error })
}
