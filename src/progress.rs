//! Progress events emitted by comparison runs, and ways to consume them

use crate::segment::HashSegment;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::time::Duration;

/// Default capacity of the progress channel
pub const DEFAULT_PROGRESS_CAPACITY: usize = 256;

/// Phase a run or segment is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStage {
    Queued,
    Counting,
    Splitting,
    Inserting,
    BucketComplete,
    Finalizing,
    Done,
}

impl ProgressStage {
    pub fn label(&self) -> &'static str {
        match self {
            ProgressStage::Queued => "queued",
            ProgressStage::Counting => "counting",
            ProgressStage::Splitting => "splitting",
            ProgressStage::Inserting => "inserting",
            ProgressStage::BucketComplete => "bucket-complete",
            ProgressStage::Finalizing => "finalizing",
            ProgressStage::Done => "done",
        }
    }
}

/// Snapshot of a run at one phase transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    pub segment: Option<HashSegment>,
    pub completed_buckets: u64,
    pub pending_buckets: u64,
    /// Completed plus pending, plus one while a bucket is being worked on
    pub total_buckets: u64,
    pub processed_rows: u64,
    pub count_a: Option<u64>,
    pub count_b: Option<u64>,
    pub diff_rows: Option<u64>,
}

/// Receiver of progress events.
///
/// Implementations must return promptly; the executor calls `emit` inline.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Sink writing into a bounded channel without ever blocking.
///
/// Events that do not fit are dropped; a consumer only ever needs the latest
/// counters, which the next event carries again.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: SyncSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(sender: SyncSender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, event: ProgressEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::trace!("Progress channel full, dropped {} event", event.stage.label());
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Bounded, non-blocking progress channel
pub fn progress_channel(capacity: usize) -> (ChannelProgress, Receiver<ProgressEvent>) {
    let (sender, receiver) = sync_channel(capacity.max(1));
    (ChannelProgress::new(sender), receiver)
}

/// Terminal rendering of progress events for the CLI
#[derive(Debug)]
pub struct ProgressReporter {
    setup_pb: Option<ProgressBar>,
    buckets_pb: Option<ProgressBar>,
    show_progress: bool,
}

impl ProgressReporter {
    /// Reporter drawing a spinner, then a bucket progress bar
    pub fn new_for_compare() -> Self {
        Self {
            setup_pb: Some(create_spinner("Counting rows...")),
            buckets_pb: None,
            show_progress: true,
        }
    }

    /// Reporter that draws nothing
    pub fn new_minimal() -> Self {
        Self {
            setup_pb: None,
            buckets_pb: None,
            show_progress: false,
        }
    }

    fn ensure_buckets_pb(&mut self, total: u64) -> Option<&ProgressBar> {
        if self.show_progress && self.buckets_pb.is_none() {
            if let Some(pb) = self.setup_pb.take() {
                pb.finish_and_clear();
            }
            self.buckets_pb = Some(create_progress_bar(total, "Comparing buckets"));
        }
        self.buckets_pb.as_ref()
    }

    /// Apply one event to the bars
    pub fn update(&mut self, event: &ProgressEvent) {
        if !self.show_progress {
            return;
        }
        if event.stage == ProgressStage::Counting && event.segment.is_none() {
            if let Some(pb) = &self.setup_pb {
                pb.set_message("Counting rows per bucket...");
            }
            return;
        }

        if let Some(pb) = self.ensure_buckets_pb(event.total_buckets) {
            pb.set_length(event.total_buckets.max(1));
            pb.set_position(event.completed_buckets);
            let segment = event
                .segment
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            pb.set_message(format!(
                "{} {} | {} rows | {} diff rows",
                event.stage.label(),
                segment,
                event.processed_rows,
                event.diff_rows.unwrap_or(0)
            ));
        }
    }

    /// Drain `events` until every sender is gone
    pub fn consume(&mut self, events: Receiver<ProgressEvent>) {
        for event in events {
            self.update(&event);
        }
    }

    pub fn finish(&mut self, message: &str) {
        if let Some(pb) = self.setup_pb.take() {
            pb.finish_and_clear();
        }
        if let Some(pb) = self.buckets_pb.take() {
            pb.finish_with_message(message.to_string());
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(pb) = self.setup_pb.take() {
            pb.finish_and_clear();
        }
        if let Some(pb) = self.buckets_pb.take() {
            pb.finish_and_clear();
        }
    }
}

/// Create a spinner progress bar
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.green} {msg}")
            .expect("Invalid progress template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a progress bar with known total
fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total.max(1));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>5}/{len:5} {msg}")
            .expect("Invalid progress template")
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}
