use indicatif::{ProgressBar, ProgressStyle};

use crate::batch::{BatchState, ChunkInfo, ChunkSummary};

/// Receives the orchestrator's feed. All calls come from the aggregating task,
/// never from row workers.
pub trait Progress: Send + Sync {
    fn state_changed(&self, _state: &BatchState) {}
    fn chunk_started(&self, _chunk: &ChunkInfo) {}
    fn row_finished(&self) {}
    fn chunk_finished(&self, _summary: &ChunkSummary) {}
}

/// Discards everything.
pub struct NoProgress;

impl Progress for NoProgress {}

/// Terminal progress bar over all rows, with one line per finished chunk.
pub struct BarProgress {
    pb: ProgressBar,
}

impl BarProgress {
    pub fn new(total_rows: usize) -> Self {
        let pb = ProgressBar::new(total_rows as u64);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({per_sec}, eta {eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        BarProgress { pb }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl Progress for BarProgress {
    fn state_changed(&self, state: &BatchState) {
        if matches!(state, BatchState::Cancelled) {
            self.pb.set_message("cancelling");
        }
    }

    fn chunk_started(&self, chunk: &ChunkInfo) {
        self.pb.set_message(format!(
            "block {}/{} ({} rows)",
            chunk.index + 1,
            chunk.total,
            chunk.size
        ));
    }

    fn row_finished(&self) {
        self.pb.inc(1);
    }

    fn chunk_finished(&self, summary: &ChunkSummary) {
        let line = if summary.non_compliant == 0 {
            format!("Block {}: all links operational", summary.index + 1)
        } else {
            format!(
                "Block {}: {} non-compliant link(s) in {} rows",
                summary.index + 1,
                summary.non_compliant,
                summary.size
            )
        };
        self.pb.println(line);
    }
}
