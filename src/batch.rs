use std::collections::BTreeMap;
use std::ops::Range;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::check::{Classify, Label};
use crate::progress::Progress;
use crate::row::{detect_url, AnnotatedRow, RowOutcome, RowProcessor};
use crate::table::{Row, Table};

pub const DEFAULT_CHUNK_SIZE: usize = 300;
pub const DEFAULT_WORKERS: usize = 20;

/// Pool size and chunking for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub chunk_size: usize,
    pub workers: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        BatchSettings {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: DEFAULT_WORKERS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Chunking { chunks: usize },
    ChunkInFlight { index: usize },
    Done,
    Cancelled,
}

/// Announced before a chunk's fan-out starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    pub index: usize,
    pub total: usize,
    pub start: usize,
    pub size: usize,
}

/// Reported once a chunk's fan-out has fully completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkSummary {
    pub index: usize,
    pub size: usize,
    pub processed: usize,
    pub non_compliant: usize,
}

/// Per-outcome counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub without_link: usize,
    pub compliant: usize,
    pub non_compliant: usize,
    pub by_label: BTreeMap<&'static str, usize>,
}

impl Tally {
    fn record(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::NoLink => self.without_link += 1,
            RowOutcome::Compliant { .. } => {
                self.compliant += 1;
                *self.by_label.entry(Label::Operational.key()).or_default() += 1;
            }
            RowOutcome::NonCompliant(a) => {
                self.non_compliant += 1;
                *self.by_label.entry(a.label.key()).or_default() += 1;
            }
        }
    }

    fn merge(&mut self, other: Tally) {
        self.without_link += other.without_link;
        self.compliant += other.compliant;
        self.non_compliant += other.non_compliant;
        for (k, v) in other.by_label {
            *self.by_label.entry(k).or_default() += v;
        }
    }
}

/// Everything a run produced. Only fully completed chunks contribute.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub total_rows: usize,
    pub processed_rows: usize,
    pub annotated: Vec<AnnotatedRow>,
    pub chunks: Vec<ChunkSummary>,
    pub tally: Tally,
    pub state: BatchState,
}

impl RunOutcome {
    pub fn non_compliant(&self) -> usize {
        self.annotated.len()
    }

    pub fn cancelled(&self) -> bool {
        self.state == BatchState::Cancelled
    }
}

/// Contiguous, disjoint ranges covering `0..len`; the last may be shorter.
pub fn chunk_bounds(len: usize, chunk_size: usize) -> Vec<Range<usize>> {
    let size = chunk_size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

#[derive(Default)]
struct ChunkResult {
    processed: usize,
    annotated: Vec<AnnotatedRow>,
    tally: Tally,
}

enum TaskReport {
    Done(RowOutcome),
    Cancelled,
}

pub struct BatchOrchestrator<C> {
    processor: RowProcessor<C>,
    settings: BatchSettings,
    semaphore: Arc<Semaphore>,
}

impl<C: Classify> BatchOrchestrator<C> {
    pub fn new(processor: RowProcessor<C>, settings: BatchSettings) -> Self {
        let workers = settings.workers.max(1);
        BatchOrchestrator {
            processor,
            settings,
            semaphore: Arc::new(Semaphore::new(workers)),
        }
    }

    pub fn settings(&self) -> BatchSettings {
        self.settings
    }

    /// Process every row chunk by chunk. Chunk N+1 starts only after all of
    /// chunk N's tasks have reported back.
    pub async fn run(
        &self,
        table: &Table,
        progress: &dyn Progress,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let mut outcome = RunOutcome {
            total_rows: table.len(),
            processed_rows: 0,
            annotated: Vec::new(),
            chunks: Vec::new(),
            tally: Tally::default(),
            state: BatchState::Idle,
        };

        let bounds = chunk_bounds(table.len(), self.settings.chunk_size);
        let total = bounds.len();
        transition(&mut outcome.state, BatchState::Chunking { chunks: total }, progress);
        info!(
            rows = table.len(),
            chunks = total,
            chunk_size = self.settings.chunk_size,
            workers = self.settings.workers,
            "starting link verification"
        );

        for (index, range) in bounds.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            transition(&mut outcome.state, BatchState::ChunkInFlight { index }, progress);

            let chunk = ChunkInfo {
                index,
                total,
                start: range.start,
                size: range.len(),
            };
            progress.chunk_started(&chunk);

            let Some(result) = self.run_chunk(&table.rows()[range], progress, cancel).await else {
                info!(chunk = index + 1, "chunk discarded after cancellation");
                break;
            };

            let summary = ChunkSummary {
                index,
                size: chunk.size,
                processed: result.processed,
                non_compliant: result.annotated.len(),
            };
            info!(
                chunk = index + 1,
                of = total,
                rows = summary.size,
                non_compliant = summary.non_compliant,
                "chunk done"
            );

            outcome.processed_rows += result.processed;
            outcome.annotated.extend(result.annotated);
            outcome.tally.merge(result.tally);
            outcome.chunks.push(summary);
            progress.chunk_finished(&summary);
        }

        let last = if outcome.chunks.len() == total {
            BatchState::Done
        } else {
            BatchState::Cancelled
        };
        transition(&mut outcome.state, last, progress);
        info!(
            processed = outcome.processed_rows,
            non_compliant = outcome.non_compliant(),
            cancelled = outcome.cancelled(),
            "link verification finished"
        );
        outcome
    }

    /// Fan out one task per row and aggregate on this task. `None` when the
    /// run was cancelled before every row reported.
    async fn run_chunk(
        &self,
        rows: &[Row],
        progress: &dyn Progress,
        cancel: &CancellationToken,
    ) -> Option<ChunkResult> {
        let (tx, mut rx) = mpsc::channel::<TaskReport>(self.settings.workers.max(1) * 2);

        for row in rows {
            let processor = self.processor.clone();
            let semaphore = Arc::clone(&self.semaphore);
            let cancel = cancel.clone();
            let tx = tx.clone();
            let row = row.clone();

            tokio::spawn(async move {
                let report = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => TaskReport::Cancelled,
                    report = process_isolated(processor, semaphore, row) => report,
                };
                let _ = tx.send(report).await;
            });
        }

        // rx closes once every task has sent and dropped its sender
        drop(tx);

        let mut result = ChunkResult::default();
        let mut cancelled = false;
        while let Some(report) = rx.recv().await {
            match report {
                TaskReport::Done(outcome) => {
                    result.processed += 1;
                    result.tally.record(&outcome);
                    if let Some(a) = outcome.into_annotated() {
                        result.annotated.push(a);
                    }
                    progress.row_finished();
                }
                TaskReport::Cancelled => cancelled = true,
            }
        }

        if cancelled {
            return None;
        }
        result.annotated.sort_by_key(|a| a.row.index());
        Some(result)
    }
}

/// Runs one row behind a pool permit. A panic while processing becomes an
/// `UnknownError` annotation for that row.
async fn process_isolated<C: Classify>(
    processor: RowProcessor<C>,
    semaphore: Arc<Semaphore>,
    row: Row,
) -> TaskReport {
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return TaskReport::Cancelled;
    };

    let mut worker = {
        let row = row.clone();
        tokio::spawn(async move { processor.inspect(&row).await })
    };
    // dropping this future (cancellation) must not leave the probe running
    let _guard = AbortOnDrop(worker.abort_handle());

    match (&mut worker).await {
        Ok(outcome) => {
            debug!(row = row.index(), "row processed");
            TaskReport::Done(outcome)
        }
        Err(e) => {
            warn!(row = row.index(), error = %e, "row task failed, recording unknown error");
            let url = std::panic::catch_unwind(AssertUnwindSafe(|| detect_url(&row)))
                .ok()
                .flatten();
            TaskReport::Done(RowOutcome::NonCompliant(AnnotatedRow {
                row,
                url,
                label: Label::UnknownError,
            }))
        }
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn transition(state: &mut BatchState, next: BatchState, progress: &dyn Progress) {
    debug!(from = ?state, to = ?next, "batch state");
    *state = next;
    progress.state_changed(state);
}
