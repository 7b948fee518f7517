//! Frame-parallel video export.
//!
//! A producer thread pulls decoded frames from a [`FrameSource`] into a
//! bounded queue, a pool of workers remaps them, and the calling thread hands
//! the results to a [`FrameSink`] strictly in source order. Frames may finish
//! out of order; a reorder buffer holds them until their turn.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::params::ProjectionParameters;
use crate::raster::Raster;
use crate::remap::remap;

/// Sequential supplier of decoded frames.
pub trait FrameSource: Send {
    /// Next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Raster>>;

    /// Number of frames the container claims to hold, if known. No more
    /// than this many frames are read.
    fn frame_count(&self) -> Option<usize> {
        None
    }

    /// Best guess at the length, used only for progress.
    fn estimated_frame_count(&self) -> Option<usize> {
        self.frame_count()
    }
}

/// Sequential consumer of finished frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Raster) -> Result<()>;

    /// Flushes and closes the output. Called once after the last frame.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Receives percent-complete updates (0-100).
pub trait ProgressSink {
    fn report(&mut self, percent: u8);
}

impl<F: FnMut(u8)> ProgressSink for F {
    fn report(&mut self, percent: u8) {
        self(percent)
    }
}

/// Requests that an export stop submitting new frames.
///
/// Frames already handed to the workers are still written, so the output
/// stays a valid prefix of the full export.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Frames remapped concurrently.
    pub workers: usize,
    /// Capacity of the decoded and finished frame queues.
    pub queue_depth: usize,
    /// Treat a truncated trailing frame as a decode error instead of the end
    /// of the stream.
    pub strict_frames: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            workers: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            queue_depth: 8,
            strict_frames: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStats {
    pub frames_written: usize,
    pub cancelled: bool,
}

struct FrameJob {
    index: usize,
    frame: Raster,
}

type FrameResult = (usize, Result<Raster>);

/// Remaps every frame of `source` into `sink` with the same parameters.
///
/// The first error from decoding, remapping or encoding ends the export and
/// is returned; frames written before it stay written. When the source
/// knows its frame count, no more than that many frames are read.
pub fn run<S, K, P>(
    source: &mut S,
    sink: &mut K,
    params: &ProjectionParameters,
    options: &PipelineOptions,
    progress: &mut P,
    cancel: &CancelToken,
) -> Result<PipelineStats>
where
    S: FrameSource + ?Sized,
    K: FrameSink + ?Sized,
    P: ProgressSink + ?Sized,
{
    params.validate()?;
    let workers = options.workers.max(1);
    let queue_depth = options.queue_depth.max(1);
    let limit = source.frame_count();
    let total = source.estimated_frame_count();
    let stop = AtomicBool::new(false);

    match (limit, total) {
        (Some(n), _) => info!("exporting {n} frames with {workers} workers"),
        (None, Some(n)) => info!("exporting about {n} frames with {workers} workers"),
        (None, None) => info!("exporting frames with {workers} workers, count unknown"),
    }

    let written = thread::scope(|scope| {
        let (job_tx, job_rx) = bounded::<FrameJob>(queue_depth);
        let (result_tx, result_rx) = bounded::<FrameResult>(queue_depth);

        {
            let result_tx = result_tx.clone();
            let stop = &stop;
            scope.spawn(move || produce(source, limit, job_tx, result_tx, cancel, stop));
        }

        for worker_id in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                debug!("remap worker {worker_id} started");
                for job in job_rx {
                    let result = remap(&job.frame, params);
                    if result_tx.send((job.index, result)).is_err() {
                        break;
                    }
                }
                debug!("remap worker {worker_id} shutting down");
            });
        }
        drop(job_rx);
        drop(result_tx);

        let mut writer = OrderedWriter::new(sink, progress, total);
        let outcome = writer.drain(result_rx);
        if outcome.is_err() {
            stop.store(true, Ordering::Relaxed);
        }
        outcome
    })?;

    sink.finish()?;

    let cancelled = cancel.is_cancelled();
    if cancelled {
        warn!("export cancelled, {written} frames written");
    } else {
        progress.report(100);
        info!("export finished, {written} frames written");
    }
    Ok(PipelineStats {
        frames_written: written,
        cancelled,
    })
}

fn produce<S>(
    source: &mut S,
    limit: Option<usize>,
    jobs: Sender<FrameJob>,
    results: Sender<FrameResult>,
    cancel: &CancelToken,
    stop: &AtomicBool,
) where
    S: FrameSource + ?Sized,
{
    let mut index = 0;
    loop {
        if limit.is_some_and(|n| index >= n) || stop.load(Ordering::Relaxed) {
            break;
        }
        if cancel.is_cancelled() {
            info!("cancellation requested after {index} frames");
            break;
        }
        match source.next_frame() {
            Ok(Some(frame)) => {
                if jobs.send(FrameJob { index, frame }).is_err() {
                    break;
                }
                index += 1;
            }
            Ok(None) => {
                debug!("source exhausted after {index} frames");
                break;
            }
            Err(e) => {
                let _ = results.send((index, Err(e)));
                break;
            }
        }
    }
}

/// Writes finished frames in index order and reports progress.
struct OrderedWriter<'a, K: ?Sized, P: ?Sized> {
    sink: &'a mut K,
    progress: &'a mut P,
    total: Option<usize>,
    pending: BTreeMap<usize, Raster>,
    next: usize,
}

impl<'a, K, P> OrderedWriter<'a, K, P>
where
    K: FrameSink + ?Sized,
    P: ProgressSink + ?Sized,
{
    fn new(sink: &'a mut K, progress: &'a mut P, total: Option<usize>) -> Self {
        OrderedWriter {
            sink,
            progress,
            total,
            pending: BTreeMap::new(),
            next: 0,
        }
    }

    /// Consumes results until every worker has hung up. Returns the number
    /// of frames written.
    fn drain(&mut self, results: Receiver<FrameResult>) -> Result<usize> {
        for (index, result) in results {
            self.pending.insert(index, result?);
            while let Some(frame) = self.pending.remove(&self.next) {
                self.sink.write_frame(&frame)?;
                self.next += 1;
                self.report();
            }
        }
        if !self.pending.is_empty() {
            warn!(
                "{} finished frames never became writable",
                self.pending.len()
            );
        }
        Ok(self.next)
    }

    /// Holds at 99 until the export is finished, since the total may only
    /// be an estimate.
    fn report(&mut self) {
        if let Some(total) = self.total.filter(|&n| n > 0) {
            let percent = (self.next * 100 / total).min(99) as u8;
            self.progress.report(percent);
        }
    }
}
