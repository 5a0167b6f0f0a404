use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tokio::task::JoinError;

use crate::batch::{ChunkSummary, RunOutcome};
use crate::check::Taxonomy;
use crate::row::AnnotatedRow;
use crate::table::Schema;

pub const LABEL_COLUMN: &str = "Motivo de incumplimiento";
pub const URL_COLUMN: &str = "URL detectada";
pub const TRACE_SEPARATOR: &str = "; ";

/// Final table handed to export, or the explicit all-clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportBody {
    AllCompliant,
    Findings {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

impl ReportBody {
    pub fn len(&self) -> usize {
        match self {
            ReportBody::AllCompliant => 0,
            ReportBody::Findings { rows, .. } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Column names of the findings table. Synthesized names never shadow an
/// input column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportColumns {
    pub label: String,
    pub original: Vec<String>,
    pub url: String,
    pub trace: String,
}

impl ReportColumns {
    pub fn for_schema(schema: &Schema) -> Self {
        let mut taken: HashSet<String> = schema.names().iter().cloned().collect();
        let label = claim(LABEL_COLUMN, &mut taken);
        let url = claim(URL_COLUMN, &mut taken);
        let trace = claim(&schema.names().join(TRACE_SEPARATOR), &mut taken);
        ReportColumns {
            label,
            original: schema.names().to_vec(),
            url,
            trace,
        }
    }

    /// `[label, originals..., url, trace]`
    pub fn ordered(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.original.len() + 3);
        out.push(self.label.clone());
        out.extend(self.original.iter().cloned());
        out.push(self.url.clone());
        out.push(self.trace.clone());
        out
    }
}

/// `base`, or `base (2)`, `base (3)`, ... whichever is free first.
fn claim(base: &str, taken: &mut HashSet<String>) -> String {
    let mut name = base.to_string();
    let mut n = 2;
    while taken.contains(&name) {
        name = format!("{} ({})", base, n);
        n += 1;
    }
    taken.insert(name.clone());
    name
}

/// Lay out the non-compliant rows of a run for export.
pub fn assemble(annotated: &[AnnotatedRow], schema: &Schema, taxonomy: Taxonomy) -> ReportBody {
    if annotated.is_empty() {
        return ReportBody::AllCompliant;
    }

    let columns = ReportColumns::for_schema(schema).ordered();
    let rows = annotated
        .par_iter()
        .map(|a| render_row(a, taxonomy))
        .collect();

    ReportBody::Findings { columns, rows }
}

/// `assemble` on the blocking pool, so rayon never stalls a runtime worker.
pub async fn assemble_blocking(
    annotated: Vec<AnnotatedRow>,
    schema: Arc<Schema>,
    taxonomy: Taxonomy,
) -> Result<ReportBody, JoinError> {
    tokio::task::spawn_blocking(move || assemble(&annotated, &schema, taxonomy)).await
}

fn render_row(a: &AnnotatedRow, taxonomy: Taxonomy) -> Vec<String> {
    let originals: Vec<&str> = a.row.cells().map(|c| c.unwrap_or("")).collect();
    let mut out = Vec::with_capacity(originals.len() + 3);
    out.push(a.label.phrase(taxonomy));
    out.extend(originals.iter().map(|s| s.to_string()));
    out.push(a.url.as_ref().map(|u| u.to_string()).unwrap_or_default());
    out.push(originals.join(TRACE_SEPARATOR));
    out
}

/// Counts for presentation and the JSON summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_rows: usize,
    pub processed_rows: usize,
    pub rows_without_link: usize,
    pub compliant_rows: usize,
    pub non_compliant_rows: usize,
    pub by_label: BTreeMap<&'static str, usize>,
    pub chunks: Vec<ChunkSummary>,
    pub cancelled: bool,
    pub taxonomy: Taxonomy,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn from_outcome(
        outcome: &RunOutcome,
        taxonomy: Taxonomy,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        RunSummary {
            total_rows: outcome.total_rows,
            processed_rows: outcome.processed_rows,
            rows_without_link: outcome.tally.without_link,
            compliant_rows: outcome.tally.compliant,
            non_compliant_rows: outcome.non_compliant(),
            by_label: outcome.tally.by_label.clone(),
            chunks: outcome.chunks.clone(),
            cancelled: outcome.cancelled(),
            taxonomy,
            started_at,
            finished_at,
        }
    }

    pub fn all_compliant(&self) -> bool {
        self.non_compliant_rows == 0
    }
}
