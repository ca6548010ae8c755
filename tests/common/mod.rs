//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio::sync::{Semaphore, broadcast};

use lookout::audio::{AudioOutput, AudioSource, StopSignal};
use lookout::capture::DetectorOptions;
use lookout::upload::TransportResponse;
use lookout::{
    Backpressure, Capabilities, CaptureEvent, CaptureService, Config, EncodedImage, Error,
    FaceClassifier, FaceRegion, FrameHandler, FrameSource, Plane, RawFrame, Result, Transport,
    YuvImage,
};

pub const CAPTURE_CUE: &str = "capture-cue.wav";
pub const ERROR_CUE: &str = "error-cue.wav";

/// Classifier answering from a script, then missing
#[derive(Default)]
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<Result<Vec<FaceRegion>>>>,
    calls: AtomicUsize,
    hold: Option<Arc<Semaphore>>,
}

impl ScriptedClassifier {
    pub fn new(script: Vec<Result<Vec<FaceRegion>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Every call waits for a permit on `hold` before answering
    pub fn held(script: Vec<Result<Vec<FaceRegion>>>, hold: Arc<Semaphore>) -> Self {
        Self {
            hold: Some(hold),
            ..Self::new(script)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceClassifier for ScriptedClassifier {
    async fn classify(
        &self,
        frame: &RawFrame,
        _options: &DetectorOptions,
    ) -> Result<Vec<FaceRegion>> {
        assert!(frame.has_image(), "classifier received a frame without payload");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hold) = &self.hold {
            hold.acquire().await.expect("hold closed").forget();
        }
        self.script.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// One face covering most of a test frame
pub fn hit() -> Result<Vec<FaceRegion>> {
    Ok(vec![FaceRegion::new(1, 1, 2, 2)])
}

/// Canned transport behaviour
#[derive(Debug, Clone)]
pub enum Reply {
    Audio(Vec<u8>),
    Status(StatusCode),
    Unreachable,
}

pub struct StubTransport {
    reply: Reply,
    calls: AtomicUsize,
    sent_bytes: AtomicUsize,
    hold: Option<Arc<Semaphore>>,
}

impl StubTransport {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            sent_bytes: AtomicUsize::new(0),
            hold: None,
        }
    }

    pub fn held(reply: Reply, hold: Arc<Semaphore>) -> Self {
        Self {
            hold: Some(hold),
            ..Self::new(reply)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent_bytes(&self) -> usize {
        self.sent_bytes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn post_image(&self, image: EncodedImage) -> Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent_bytes.store(image.len(), Ordering::SeqCst);
        if let Some(hold) = &self.hold {
            hold.acquire().await.expect("hold closed").forget();
        }
        match &self.reply {
            Reply::Audio(body) => Ok(TransportResponse {
                status: StatusCode::OK,
                body: body.clone(),
            }),
            Reply::Status(status) => Ok(TransportResponse {
                status: *status,
                body: b"rejected".to_vec(),
            }),
            Reply::Unreachable => Err(Error::Upload("connection refused".to_string())),
        }
    }
}

/// What the output device was asked to play
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Played {
    CaptureCue,
    ErrorCue,
    Reply { path: PathBuf, existed: bool },
}

/// Output that records requests instead of touching a device
#[derive(Default)]
pub struct RecordingOutput {
    played: Mutex<Vec<Played>>,
    fail_cues: AtomicBool,
    hold_cues: Option<Arc<Semaphore>>,
}

impl RecordingOutput {
    /// Fail every cue, as a missing cue file would
    pub fn failing_cues() -> Self {
        let output = Self::default();
        output.fail_cues.store(true, Ordering::SeqCst);
        output
    }

    /// Block every cue until a permit is added to `hold`
    pub fn held_cues(hold: Arc<Semaphore>) -> Self {
        Self {
            hold_cues: Some(hold),
            ..Self::default()
        }
    }

    pub fn played(&self) -> Vec<Played> {
        self.played.lock().clone()
    }
}

impl AudioOutput for RecordingOutput {
    fn play(&self, source: &AudioSource, _stop: &StopSignal) -> Result<()> {
        let AudioSource::File(path) = source else {
            panic!("test config routes every cue through a file");
        };
        let played = match path.file_name().and_then(|n| n.to_str()) {
            Some(CAPTURE_CUE) => Played::CaptureCue,
            Some(ERROR_CUE) => Played::ErrorCue,
            _ => Played::Reply {
                path: path.clone(),
                existed: path.exists(),
            },
        };
        let is_cue = !matches!(played, Played::Reply { .. });
        self.played.lock().push(played);

        if let Some(hold) = self.hold_cues.as_ref().filter(|_| is_cue) {
            block_on_permit(hold);
        }

        if is_cue && self.fail_cues.load(Ordering::SeqCst) {
            return Err(Error::Audio("cue file missing".to_string()));
        }
        Ok(())
    }
}

/// Take one permit from a synchronous caller, polling
fn block_on_permit(hold: &Semaphore) {
    loop {
        if let Ok(permit) = hold.try_acquire() {
            permit.forget();
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Frame source driven by the test
#[derive(Default)]
pub struct ManualSource {
    handler: Mutex<Option<FrameHandler>>,
    running: AtomicBool,
    starts: AtomicUsize,
    fail_start: AtomicBool,
    hold_start: Option<Arc<Semaphore>>,
}

impl ManualSource {
    pub fn failing() -> Self {
        let source = Self::default();
        source.fail_start.store(true, Ordering::SeqCst);
        source
    }

    /// Block `start` until a permit is added to `hold`
    pub fn held_start(hold: Arc<Semaphore>) -> Self {
        Self {
            hold_start: Some(hold),
            ..Self::default()
        }
    }

    /// Deliver a frame to the registered handler
    pub fn push(&self, frame: RawFrame) {
        let handler = self.handler.lock().clone().expect("no frame handler registered");
        handler(frame);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

impl FrameSource for ManualSource {
    fn register(&self, handler: FrameHandler, backpressure: Backpressure) -> Result<()> {
        assert_eq!(backpressure, Backpressure::KeepLatest);
        *self.handler.lock() = Some(handler);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::Camera("camera busy".to_string()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(hold) = &self.hold_start {
            block_on_permit(hold);
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Counts frame releases
#[derive(Clone, Default)]
pub struct Releases(Arc<AtomicUsize>);

impl Releases {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// 4x4 mid-gray I420 frame reporting its release here
    pub fn frame(&self) -> RawFrame {
        let image = YuvImage::from_i420(&[128u8; 24], 4, 4).expect("valid I420 size");
        self.track(RawFrame::new(4, 4, image))
    }

    /// Frame whose chroma planes are too short to encode
    pub fn broken_frame(&self) -> RawFrame {
        let image = YuvImage {
            y: Plane::packed(vec![128; 16], 4),
            u: Plane::packed(vec![128; 1], 2),
            v: Plane::packed(vec![128; 1], 2),
        };
        self.track(RawFrame::new(4, 4, image))
    }

    /// Frame without a payload
    pub fn empty_frame(&self) -> RawFrame {
        self.track(RawFrame::empty(4, 4))
    }

    fn track(&self, frame: RawFrame) -> RawFrame {
        let counter = Arc::clone(&self.0);
        frame.on_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Config writing reply audio under `temp_dir` with file-backed cues
pub fn test_config(temp_dir: &Path) -> Config {
    let mut config = Config::default();
    config.audio.temp_dir = temp_dir.to_path_buf();
    config.audio.capture_cue = Some(PathBuf::from(CAPTURE_CUE));
    config.audio.error_cue = Some(PathBuf::from(ERROR_CUE));
    config
}

/// Service plus handles on every test double
pub struct Harness {
    pub service: Arc<CaptureService>,
    pub source: Arc<ManualSource>,
    pub classifier: Arc<ScriptedClassifier>,
    pub transport: Arc<StubTransport>,
    pub output: Arc<RecordingOutput>,
    pub releases: Releases,
    pub temp: tempfile::TempDir,
}

impl Harness {
    pub fn new(classifier: ScriptedClassifier, transport: StubTransport) -> Self {
        Self::with_parts(
            ManualSource::default(),
            classifier,
            transport,
            RecordingOutput::default(),
        )
    }

    pub fn with_parts(
        source: ManualSource,
        classifier: ScriptedClassifier,
        transport: StubTransport,
        output: RecordingOutput,
    ) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = Arc::new(source);
        let classifier = Arc::new(classifier);
        let transport = Arc::new(transport);
        let output = Arc::new(output);

        let service = CaptureService::new(
            &test_config(temp.path()),
            Capabilities {
                source: source.clone(),
                classifier: classifier.clone(),
                transport: transport.clone(),
                audio: output.clone(),
            },
        )
        .map(Arc::new)
        .expect("service");

        Self {
            service,
            source,
            classifier,
            transport,
            output,
            releases: Releases::default(),
            temp,
        }
    }

    /// Files currently in the reply temp dir
    pub fn temp_files(&self) -> usize {
        std::fs::read_dir(self.temp.path()).expect("read temp dir").count()
    }
}

/// Receive events until one matches
pub async fn wait_for(
    events: &mut broadcast::Receiver<CaptureEvent>,
    matches: impl Fn(&CaptureEvent) -> bool,
) -> CaptureEvent {
    loop {
        let event = events.recv().await.expect("event stream closed");
        if matches(&event) {
            return event;
        }
    }
}

/// Yield until `done` holds, failing after a generous bound
pub async fn settle(done: impl Fn() -> bool) {
    for _ in 0..1000 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached");
}
