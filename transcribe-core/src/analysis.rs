//! # Pitch Stream Analysis Module
//!
//! Slides the YIN tracker over a whole mono recording at a fixed hop and
//! collects parallel frequency and confidence arrays.
//!
//! Three ways to drive a scan are offered:
//! - [`analyze`]: a plain synchronous loop with a progress callback
//! - [`PitchFrames`] / [`Chunks`]: lazy iterators a host can step at its own pace
//! - [`spawn_analysis`]: a dedicated worker thread reporting over a channel,
//!   with cooperative cancellation

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::{config::AnalysisConfig, pitch, PitchEstimate};

/// Number of frames between two progress reports.
pub const PROGRESS_INTERVAL: usize = 64;

/// Per-frame pitch estimates of a recording, with the frame timing needed
/// to place them in time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PitchTrack {
    pub frequencies: Vec<f32>,
    pub confidences: Vec<f32>,
    pub hop_size: usize,
    pub sample_rate: u32,
}

impl PitchTrack {
    pub fn new(hop_size: usize, sample_rate: u32) -> Self {
        Self {
            frequencies: Vec::new(),
            confidences: Vec::new(),
            hop_size,
            sample_rate,
        }
    }

    /// Builds a track from existing parallel arrays.
    ///
    /// The arrays must have the same length.
    pub fn from_parts(
        frequencies: Vec<f32>,
        confidences: Vec<f32>,
        hop_size: usize,
        sample_rate: u32,
    ) -> Self {
        debug_assert_eq!(frequencies.len(), confidences.len());
        Self {
            frequencies,
            confidences,
            hop_size,
            sample_rate,
        }
    }

    pub fn push(&mut self, estimate: PitchEstimate) {
        self.frequencies.push(estimate.frequency);
        self.confidences.push(estimate.confidence);
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Start time of frame `index` in seconds.
    pub fn frame_time(&self, index: usize) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (index * self.hop_size) as f64 / self.sample_rate as f64
    }

    /// Time covered by the track, i.e. the start of the frame after the last.
    pub fn duration(&self) -> f64 {
        self.frame_time(self.len())
    }

    /// Index of the first frame starting at or after `time`.
    pub fn first_frame_at(&self, time: f64) -> usize {
        if time <= 0.0 || self.hop_size == 0 {
            return 0;
        }
        let estimate = (time * self.sample_rate as f64 / self.hop_size as f64).floor();
        let mut index = (estimate as usize).min(self.len());
        while index > 0 && self.frame_time(index - 1) >= time {
            index -= 1;
        }
        while index < self.len() && self.frame_time(index) < time {
            index += 1;
        }
        index
    }

    pub fn estimate(&self, index: usize) -> Option<PitchEstimate> {
        Some(PitchEstimate {
            frequency: *self.frequencies.get(index)?,
            confidence: *self.confidences.get(index)?,
        })
    }
}

/// Number of frames the analyzer produces: `floor((len - frame_size) / hop)`.
pub fn frame_count(sample_count: usize, frame_size: usize, hop_size: usize) -> usize {
    if hop_size == 0 || sample_count < frame_size {
        return 0;
    }
    (sample_count - frame_size) / hop_size
}

/// Lazy, restartable sequence of per-frame estimates.
///
/// Clone it before stepping to scan the same frames again later.
#[derive(Debug, Clone)]
pub struct PitchFrames<'a> {
    samples: &'a [f32],
    sample_rate: u32,
    frame_size: usize,
    hop_size: usize,
    next_frame: usize,
    frame_count: usize,
}

impl<'a> PitchFrames<'a> {
    pub fn new(samples: &'a [f32], sample_rate: u32, config: &AnalysisConfig) -> Self {
        Self {
            samples,
            sample_rate,
            frame_size: config.frame_size,
            hop_size: config.hop_size,
            next_frame: 0,
            frame_count: frame_count(samples.len(), config.frame_size, config.hop_size),
        }
    }

    /// Total number of frames in the scan, independent of progress.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Index of the frame the next call to `next` will produce.
    pub fn position(&self) -> usize {
        self.next_frame
    }

    /// Groups the remaining frames into chunks of `chunk_len` estimates.
    pub fn chunks(self, chunk_len: usize) -> Chunks<'a> {
        Chunks {
            frames: self,
            chunk_len: chunk_len.max(1),
        }
    }
}

impl Iterator for PitchFrames<'_> {
    type Item = PitchEstimate;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_frame >= self.frame_count {
            return None;
        }
        let start = self.next_frame * self.hop_size;
        let frame = &self.samples[start..start + self.frame_size];
        self.next_frame += 1;
        Some(pitch::estimate(frame, self.sample_rate))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.frame_count - self.next_frame;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PitchFrames<'_> {}

/// A run of consecutive frame estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisChunk {
    pub first_frame: usize,
    pub estimates: Vec<PitchEstimate>,
}

/// Iterator over [`AnalysisChunk`]s, see [`PitchFrames::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    frames: PitchFrames<'a>,
    chunk_len: usize,
}

impl Chunks<'_> {
    /// Fraction of the scan completed so far.
    pub fn progress(&self) -> f32 {
        if self.frames.frame_count == 0 {
            return 1.0;
        }
        self.frames.next_frame as f32 / self.frames.frame_count as f32
    }
}

impl Iterator for Chunks<'_> {
    type Item = AnalysisChunk;

    fn next(&mut self) -> Option<Self::Item> {
        let first_frame = self.frames.position();
        let estimates: Vec<PitchEstimate> = self.frames.by_ref().take(self.chunk_len).collect();
        if estimates.is_empty() {
            None
        } else {
            Some(AnalysisChunk {
                first_frame,
                estimates,
            })
        }
    }
}

/// Runs the tracker over every frame of `samples`.
///
/// `on_progress` receives the completed fraction every
/// [`PROGRESS_INTERVAL`] frames and a final `1.0`.
pub fn analyze<F>(
    samples: &[f32],
    sample_rate: u32,
    config: &AnalysisConfig,
    mut on_progress: F,
) -> PitchTrack
where
    F: FnMut(f32),
{
    let frames = PitchFrames::new(samples, sample_rate, config);
    let total = frames.frame_count();
    log::debug!(
        "analyzing {} samples at {} Hz: {} frames of {} (hop {})",
        samples.len(),
        sample_rate,
        total,
        config.frame_size,
        config.hop_size
    );

    let mut track = PitchTrack::new(config.hop_size, sample_rate);
    track.frequencies.reserve(total);
    track.confidences.reserve(total);
    for (index, estimate) in frames.enumerate() {
        track.push(estimate);
        if (index + 1) % PROGRESS_INTERVAL == 0 {
            on_progress((index + 1) as f32 / total as f32);
        }
    }
    on_progress(1.0);

    log_summary(&track);
    track
}

fn log_summary(track: &PitchTrack) {
    let voiced = track.frequencies.iter().filter(|&&f| f > 0.0).count();
    log::info!(
        "pitch analysis finished: {} frames, {} voiced",
        track.len(),
        voiced
    );
}

/// Messages sent by the analysis worker thread.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisEvent {
    /// Fraction of frames analyzed so far.
    Progress(f32),
    Finished(PitchTrack),
    Cancelled,
}

/// Handle to a running analysis thread.
///
/// Dropping the handle cancels the scan and waits for the thread.
#[derive(Debug)]
pub struct AnalysisWorker {
    shutdown_tx: Sender<()>,
    events: Receiver<AnalysisEvent>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AnalysisWorker {
    /// Channel carrying progress and the final result.
    pub fn events(&self) -> &Receiver<AnalysisEvent> {
        &self.events
    }

    /// Asks the worker to stop at the next chunk boundary.
    pub fn cancel(&self) {
        let _ = self.shutdown_tx.try_send(());
    }

    /// Blocks until the worker delivers its result.
    ///
    /// Returns `None` if the scan was cancelled.
    pub fn wait(self) -> Option<PitchTrack> {
        for event in self.events.iter() {
            match event {
                AnalysisEvent::Progress(_) => {}
                AnalysisEvent::Finished(track) => return Some(track),
                AnalysisEvent::Cancelled => return None,
            }
        }
        None
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.cancel();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("analysis thread panicked");
            }
        }
    }
}

/// Starts the scan on a dedicated thread.
///
/// The thread owns `samples`; events arrive on [`AnalysisWorker::events`].
pub fn spawn_analysis(
    samples: Vec<f32>,
    sample_rate: u32,
    config: AnalysisConfig,
) -> AnalysisWorker {
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let thread_handle = thread::spawn(move || {
        log::debug!("analysis thread started");
        run_analysis(&samples, sample_rate, &config, &event_tx, &shutdown_rx);
        log::debug!("analysis thread exiting");
    });

    AnalysisWorker {
        shutdown_tx,
        events: event_rx,
        thread_handle: Some(thread_handle),
    }
}

/// Body of the worker thread. Checks for a shutdown signal before every chunk.
pub(crate) fn run_analysis(
    samples: &[f32],
    sample_rate: u32,
    config: &AnalysisConfig,
    events: &Sender<AnalysisEvent>,
    shutdown: &Receiver<()>,
) {
    let mut track = PitchTrack::new(config.hop_size, sample_rate);
    let mut chunks = PitchFrames::new(samples, sample_rate, config).chunks(PROGRESS_INTERVAL);

    loop {
        match shutdown.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => {
                log::info!("analysis cancelled after {} frames", track.len());
                let _ = events.send(AnalysisEvent::Cancelled);
                return;
            }
            Err(TryRecvError::Empty) => {}
        }

        let Some(chunk) = chunks.next() else {
            break;
        };
        for estimate in chunk.estimates {
            track.push(estimate);
        }
        let _ = events.send(AnalysisEvent::Progress(chunks.progress()));
    }

    log_summary(&track);
    let _ = events.send(AnalysisEvent::Finished(track));
}
