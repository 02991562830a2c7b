//! Test utilities and mock collaborators
//!
//! Mocks record every call so tests can assert on sequencing, and accept a
//! per-call failure script so retry behavior can be driven deterministically.

use crate::{
    codec::{ImageCodec, ImageCrateCodec},
    config::OutputFormat,
    error::{BgRemovalError, Result},
    location::ImageLocation,
    retry::MemoryRelief,
    segmentation::{ForegroundResult, SegmentationService},
    services::{ProcessingStage, ProgressReporter, ProgressUpdate},
    types::ProcessingTimings,
    writer::ResultWriter,
};
use image::{Rgba, RgbaImage};
use std::collections::VecDeque;
use std::sync::{mpsc, Arc, Mutex};

/// Failure injected into one mock call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    Succeed,
    MemoryPressure,
    LoadFailure,
    SegmentationFailure,
    PersistenceFailure,
}

impl Scripted {
    fn into_result(self, context: &str) -> Result<()> {
        match self {
            Self::Succeed => Ok(()),
            Self::MemoryPressure => Err(BgRemovalError::memory_pressure(format!(
                "simulated allocation failure in {}",
                context
            ))),
            Self::LoadFailure => Err(BgRemovalError::load_failure(format!(
                "simulated corrupt source in {}",
                context
            ))),
            Self::SegmentationFailure => Err(BgRemovalError::segmentation(format!(
                "simulated service failure in {}",
                context
            ))),
            Self::PersistenceFailure => Err(BgRemovalError::persistence(format!(
                "simulated disk failure in {}",
                context
            ))),
        }
    }
}

#[derive(Debug, Default)]
struct Script(Mutex<VecDeque<Scripted>>);

impl Script {
    fn new(steps: &[Scripted]) -> Self {
        Self(Mutex::new(steps.iter().copied().collect()))
    }

    fn next(&self) -> Scripted {
        self.0
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or(Scripted::Succeed)
    }
}

type CallHistory = Arc<Mutex<Vec<String>>>;

fn record(history: &CallHistory, call: String) {
    if let Ok(mut calls) = history.lock() {
        calls.push(call);
    }
}

/// 10x10 image whose only visible pixels are rows 2-4, columns 3-6
#[must_use]
pub fn reference_image() -> RgbaImage {
    let mut image = RgbaImage::new(10, 10);
    for y in 2..=4 {
        for x in 3..=6 {
            image.put_pixel(x, y, Rgba([(x * 20) as u8, (y * 20) as u8, 200, 255]));
        }
    }
    image
}

/// Codec serving a fixed source without touching the filesystem
#[derive(Debug)]
pub struct MockCodec {
    source_dimensions: (u32, u32),
    image: Option<RgbaImage>,
    wrong_decode_size: bool,
    decode_script: Script,
    encode_script: Script,
    call_history: CallHistory,
}

impl MockCodec {
    /// Source of the given size; decodes to an opaque image at the target size
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            source_dimensions: (width, height),
            image: None,
            wrong_decode_size: false,
            decode_script: Script::default(),
            encode_script: Script::default(),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Source that decodes to exactly `image`
    #[must_use]
    pub fn with_image(image: RgbaImage) -> Self {
        let mut codec = Self::new(image.width(), image.height());
        codec.image = Some(image);
        codec
    }

    #[must_use]
    pub fn with_decode_script(mut self, steps: &[Scripted]) -> Self {
        self.decode_script = Script::new(steps);
        self
    }

    #[must_use]
    pub fn with_encode_script(mut self, steps: &[Scripted]) -> Self {
        self.encode_script = Script::new(steps);
        self
    }

    #[must_use]
    pub fn with_wrong_decode_size(mut self) -> Self {
        self.wrong_decode_size = true;
        self
    }

    pub fn history(&self) -> Vec<String> {
        self.call_history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.history().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl ImageCodec for MockCodec {
    fn dimensions(&self, location: &ImageLocation) -> Result<(u32, u32)> {
        record(&self.call_history, format!("dimensions:{}", location));
        Ok(self.source_dimensions)
    }

    fn decode(
        &self,
        location: &ImageLocation,
        target_width: u32,
        target_height: u32,
    ) -> Result<RgbaImage> {
        record(
            &self.call_history,
            format!("decode:{}:{}x{}", location, target_width, target_height),
        );
        self.decode_script.next().into_result("decode")?;

        if self.wrong_decode_size {
            return Ok(RgbaImage::new(target_width + 1, target_height));
        }
        match &self.image {
            Some(image) if image.dimensions() == (target_width, target_height) => Ok(image.clone()),
            _ => Ok(RgbaImage::from_pixel(
                target_width,
                target_height,
                Rgba([50, 60, 70, 255]),
            )),
        }
    }

    fn encode(&self, image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>> {
        record(
            &self.call_history,
            format!("encode:{}x{}", image.width(), image.height()),
        );
        self.encode_script.next().into_result("encode")?;
        ImageCrateCodec::new().encode(image, format)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Segmenter that keeps the input's alpha, with scripted failures
#[derive(Debug)]
pub struct MockSegmenter {
    script: Script,
    no_foreground: bool,
    available: bool,
    call_history: CallHistory,
}

impl MockSegmenter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Script::default(),
            no_foreground: false,
            available: true,
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn with_script(mut self, steps: &[Scripted]) -> Self {
        self.script = Script::new(steps);
        self
    }

    /// Every call reports that nothing was found
    #[must_use]
    pub fn finding_nothing() -> Self {
        let mut segmenter = Self::new();
        segmenter.no_foreground = true;
        segmenter
    }

    /// Reports itself unavailable on this device
    #[must_use]
    pub fn unavailable() -> Self {
        let mut segmenter = Self::new();
        segmenter.available = false;
        segmenter
    }

    pub fn calls(&self) -> usize {
        self.call_history.lock().map(|h| h.len()).unwrap_or_default()
    }
}

impl Default for MockSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentationService for MockSegmenter {
    fn segment(&self, image: &RgbaImage) -> Result<ForegroundResult> {
        record(
            &self.call_history,
            format!("segment:{}x{}", image.width(), image.height()),
        );
        self.script.next().into_result("segment")?;
        if self.no_foreground {
            return Ok(ForegroundResult::nothing());
        }
        Ok(ForegroundResult::found(image.clone()))
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Segmenter that parks inside `segment` until released
pub struct BlockingSegmenter {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

/// Test-side handle for a [`BlockingSegmenter`]
pub struct BlockingHandle {
    entered: mpsc::Receiver<()>,
    release: mpsc::Sender<()>,
}

impl BlockingSegmenter {
    #[must_use]
    pub fn new() -> (Self, BlockingHandle) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        (
            Self {
                entered: Mutex::new(entered_tx),
                release: Mutex::new(release_rx),
            },
            BlockingHandle {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }
}

impl BlockingHandle {
    pub fn wait_until_entered(&self) {
        self.entered
            .recv_timeout(std::time::Duration::from_secs(10))
            .expect("segmenter was never entered");
    }

    pub fn release(&self) {
        self.release.send(()).expect("segmenter is gone");
    }
}

impl SegmentationService for BlockingSegmenter {
    fn segment(&self, image: &RgbaImage) -> Result<ForegroundResult> {
        if let Ok(tx) = self.entered.lock() {
            let _ = tx.send(());
        }
        if let Ok(rx) = self.release.lock() {
            let _ = rx.recv_timeout(std::time::Duration::from_secs(10));
        }
        Ok(ForegroundResult::found(image.clone()))
    }
}

/// Writer that keeps results in memory
#[derive(Debug)]
pub struct MockWriter {
    script: Script,
    written: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockWriter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Script::default(),
            written: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            script: Script::new(&[Scripted::PersistenceFailure]),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn written(&self) -> Vec<(String, Vec<u8>)> {
        self.written.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Decode the most recent result
    pub fn last_image(&self) -> Option<RgbaImage> {
        let written = self.written();
        let (_, bytes) = written.last()?;
        image::load_from_memory(bytes).ok().map(|i| i.into_rgba8())
    }
}

impl Default for MockWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultWriter for MockWriter {
    fn write(&self, bytes: &[u8], suggested_name: &str) -> Result<String> {
        self.script.next().into_result("write")?;
        if let Ok(mut written) = self.written.lock() {
            written.push((suggested_name.to_string(), bytes.to_vec()));
        }
        Ok(format!("memory://{}", suggested_name))
    }
}

/// Relief hint that records its calls
#[derive(Debug, Default)]
pub struct RecordingRelief {
    calls: Mutex<Vec<(u32, String)>>,
}

impl RecordingRelief {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(u32, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl MemoryRelief for RecordingRelief {
    fn request_relief(&self, attempt: u32, cause: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((attempt, cause.to_string()));
        }
    }
}

/// Progress reporter that records stages, errors and completions
#[derive(Debug, Default)]
pub struct RecordingReporter {
    updates: Mutex<Vec<ProgressUpdate>>,
    errors: Mutex<Vec<(ProcessingStage, String)>>,
    completions: Mutex<usize>,
}

impl RecordingReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stages(&self) -> Vec<ProcessingStage> {
        self.updates
            .lock()
            .map(|u| u.iter().map(|update| update.stage).collect())
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<(ProcessingStage, String)> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn completions(&self) -> usize {
        self.completions.lock().map(|c| *c).unwrap_or_default()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(update);
        }
    }

    fn report_completion(&self, _timings: &ProcessingTimings) {
        if let Ok(mut completions) = self.completions.lock() {
            *completions += 1;
        }
    }

    fn report_error(&self, stage: ProcessingStage, code: &str, _error: &str) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push((stage, code.to_string()));
        }
    }
}
