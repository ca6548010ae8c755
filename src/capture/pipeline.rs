//! Capture service
//!
//! Wires the gate, classifier, codec, uploader, and playback into one
//! capture cycle:
//!
//! ```text
//! frame ──► gate ──► Classify ──hit──► Encode ──► Acknowledge ──► Upload ──► Respond
//!             │          │                │        (capture cue)              │
//!          release     miss/fail:       fail:                          reply audio
//!                      back to Armed    Disarmed                       or error cue
//! ```
//!
//! Each stage runs to completion and returns the next one as data. Every
//! stage carries the cycle [`Ticket`] it was started under and checks it
//! against the gate before acting, so work from an abandoned cycle winds
//! down without touching the state machine.

use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::broadcast;

use super::detect::{Detection, DetectionAdapter, FaceClassifier, FaceRegion};
use super::gate::{Admission, ArmOutcome, CaptureGate, CaptureState, GateSnapshot, Ticket};
use crate::audio::{AudioOutput, CueKind, PlaybackController, PlaybackOutcome, PlaybackRequest};
use crate::camera::{CameraFacade, FrameSource};
use crate::codec::{EncodedImage, FrameCodec};
use crate::config::Config;
use crate::frame::RawFrame;
use crate::indicator::StatusLed;
use crate::upload::{HttpTransport, Transport, UploadCoordinator};
use crate::{Error, Result};

/// Channel capacity for capture events
const CHANNEL_CAPACITY: usize = 64;

/// Pipeline milestone broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaptureEvent {
    /// A new cycle started watching
    Armed { cycle: u64 },
    /// The service stopped watching
    Disarmed { cycle: u64 },
    /// A frame passed the gate
    FrameForwarded { cycle: u64 },
    /// Detection hit
    FaceDetected { cycle: u64, regions: Vec<FaceRegion> },
    /// Detection miss; still armed
    NoFace { cycle: u64 },
    /// Classifier error; still armed
    DetectionFailed { cycle: u64, error: String },
    /// Captured frame compressed
    Encoded { cycle: u64, bytes: usize },
    /// Captured frame could not be compressed; cycle abandoned
    EncodeFailed { cycle: u64, error: String },
    /// Endpoint answered with audio
    Uploaded { cycle: u64, audio_bytes: usize },
    /// Upload failed for any reason
    UploadFailed { cycle: u64, error: String },
    /// Cycle concluded and its final playback ended
    CycleFinished { cycle: u64 },
}

/// External capabilities the service is built from
pub struct Capabilities {
    /// Camera frames
    pub source: Arc<dyn FrameSource>,
    /// Face classifier
    pub classifier: Arc<dyn FaceClassifier>,
    /// Upload transport
    pub transport: Arc<dyn Transport>,
    /// Audio output device
    pub audio: Arc<dyn AudioOutput>,
}

impl Capabilities {
    /// Capabilities with the reqwest transport built from `config`
    ///
    /// # Errors
    ///
    /// Returns error if the upload endpoint is invalid
    pub fn with_http(
        config: &Config,
        source: Arc<dyn FrameSource>,
        classifier: Arc<dyn FaceClassifier>,
        audio: Arc<dyn AudioOutput>,
    ) -> Result<Self> {
        let transport = HttpTransport::new(
            &config.upload.endpoint,
            config.upload.timeout(),
            config.upload.form(),
        )?;
        Ok(Self {
            source,
            classifier,
            transport: Arc::new(transport),
            audio,
        })
    }
}

/// One unit of capture work and the data it needs
enum Stage {
    Classify { ticket: Ticket, frame: RawFrame },
    Encode { ticket: Ticket, frame: RawFrame },
    Acknowledge { ticket: Ticket, image: EncodedImage },
    Upload { ticket: Ticket, image: EncodedImage },
    Respond { ticket: Ticket, reply: Result<Vec<u8>> },
}

struct Inner {
    gate: CaptureGate,
    detector: DetectionAdapter,
    codec: FrameCodec,
    camera: CameraFacade,
    uploader: UploadCoordinator,
    playback: PlaybackController,
    indicator: Option<StatusLed>,
    events: broadcast::Sender<CaptureEvent>,
    runtime: Handle,
}

/// Face capture service
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct CaptureService {
    inner: Arc<Inner>,
}

impl CaptureService {
    /// Build the service and register its frame handler with the source
    ///
    /// Must be called inside a tokio runtime; stages are spawned on it.
    ///
    /// # Errors
    ///
    /// Returns error if there is no runtime or the source refuses the handler
    pub fn new(config: &Config, capabilities: Capabilities) -> Result<Self> {
        let runtime = Handle::try_current()?;
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);

        let inner = Arc::new(Inner {
            gate: CaptureGate::new(config.capture.throttle()),
            detector: DetectionAdapter::new(
                capabilities.classifier,
                config.capture.detector_options(),
            ),
            codec: FrameCodec::new(config.capture.jpeg_quality),
            camera: CameraFacade::new(capabilities.source),
            uploader: UploadCoordinator::new(capabilities.transport),
            playback: PlaybackController::new(
                capabilities.audio,
                config.audio.cue_library(),
                config.audio.temp_dir.clone(),
            ),
            indicator: config
                .indicator
                .enabled
                .then(|| StatusLed::new(config.indicator.sysfs_root.clone())),
            events,
            runtime,
        });

        // The source owns the handler; a strong reference would leak the service
        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.camera.register(Arc::new(move |frame: RawFrame| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_frame(frame);
            }
        }))?;

        inner.show(CaptureState::Disarmed);
        tracing::debug!(
            throttle_ms = config.capture.throttle_ms,
            quality = config.capture.jpeg_quality,
            "capture service ready"
        );

        Ok(Self { inner })
    }

    /// Arm signal: start the camera and watch for a face
    ///
    /// # Errors
    ///
    /// Returns error if the camera fails to start; the service stays disarmed
    pub fn arm(&self) -> Result<ArmOutcome> {
        let inner = &self.inner;
        let outcome = inner.gate.arm();
        match outcome {
            ArmOutcome::Armed(ticket) => {
                if let Err(e) = inner.camera.start() {
                    tracing::error!(error = %e, "camera failed to start, disarming");
                    inner.gate.disarm();
                    inner.show(CaptureState::Disarmed);
                    return Err(e);
                }
                // Shutdown may have closed the gate while the camera started
                if inner.gate.is_closed() {
                    inner.camera.stop();
                    tracing::debug!("shut down while arming, camera released");
                    return Ok(ArmOutcome::Ignored);
                }
                inner.show(CaptureState::Armed);
                inner.emit(CaptureEvent::Armed {
                    cycle: ticket.cycle(),
                });
                tracing::info!(cycle = ticket.cycle(), "armed");
            }
            ArmOutcome::AlreadyArmed => tracing::debug!("already armed, throttle reset"),
            ArmOutcome::Ignored if inner.gate.is_closed() => {
                tracing::debug!("arm after shutdown ignored");
            }
            ArmOutcome::Ignored => tracing::info!("capture in progress, arm ignored"),
        }
        Ok(outcome)
    }

    /// Disarm signal: stop watching and release the camera
    ///
    /// Returns false if already disarmed. In-flight work for the abandoned
    /// cycle finishes without further effect.
    pub fn disarm(&self) -> bool {
        let disarmed = self.inner.gate.disarm();
        self.inner.released(disarmed);
        disarmed
    }

    /// Feed one frame, as the registered handler does
    pub fn handle_frame(&self, frame: RawFrame) {
        self.inner.handle_frame(frame);
    }

    /// Subscribe to pipeline events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.inner.events.subscribe()
    }

    /// Current capture state
    #[must_use]
    pub fn state(&self) -> CaptureState {
        self.inner.gate.state()
    }

    /// Current state and cycle number
    #[must_use]
    pub fn snapshot(&self) -> GateSnapshot {
        self.inner.gate.snapshot()
    }

    /// Whether the camera is running
    #[must_use]
    pub fn camera_running(&self) -> bool {
        self.inner.camera.is_running()
    }

    /// Disarm, stop playback, and wait until temporary audio is deleted
    ///
    /// The service refuses to arm afterwards.
    pub async fn shutdown(&self) {
        let disarmed = self.inner.gate.close();
        self.inner.released(disarmed);
        self.inner.playback.shutdown().await;
        self.inner.show(CaptureState::Disarmed);
        tracing::info!("capture service shut down");
    }
}

impl std::fmt::Debug for CaptureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureService")
            .field("gate", &self.inner.gate.snapshot())
            .field("camera", &self.inner.camera)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn handle_frame(self: &Arc<Self>, frame: RawFrame) {
        let now = tokio::time::Instant::now().into_std();
        match self.gate.admit(now, frame.has_image()) {
            Admission::Forward(ticket) => {
                tracing::trace!(cycle = ticket.cycle(), "frame forwarded to detection");
                self.emit(CaptureEvent::FrameForwarded {
                    cycle: ticket.cycle(),
                });
                let inner = Arc::clone(self);
                self.runtime
                    .spawn(async move { inner.run(Stage::Classify { ticket, frame }).await });
            }
            admission => {
                tracing::trace!(?admission, "frame released");
                frame.release();
            }
        }
    }

    async fn run(&self, first: Stage) {
        let mut stage = Some(first);
        while let Some(current) = stage {
            stage = self.step(current).await;
        }
    }

    async fn step(&self, stage: Stage) -> Option<Stage> {
        match stage {
            Stage::Classify { ticket, frame } => self.classify(ticket, frame).await,
            Stage::Encode { ticket, frame } => self.encode(ticket, frame).await,
            Stage::Acknowledge { ticket, image } => self.acknowledge(ticket, image).await,
            Stage::Upload { ticket, image } => self.upload(ticket, image).await,
            Stage::Respond { ticket, reply } => {
                self.respond(ticket, reply).await;
                None
            }
        }
    }

    async fn classify(&self, ticket: Ticket, frame: RawFrame) -> Option<Stage> {
        let cycle = ticket.cycle();
        match self.detector.classify(&frame).await {
            Detection::Hit(regions) => {
                if !self.gate.begin_capture(ticket) {
                    tracing::debug!(cycle, "hit from abandoned cycle dropped");
                    frame.release();
                    return None;
                }
                tracing::info!(cycle, faces = regions.len(), "face captured");
                self.camera.stop();
                self.show(CaptureState::Uploading);
                self.emit(CaptureEvent::FaceDetected { cycle, regions });
                Some(Stage::Encode { ticket, frame })
            }
            Detection::Miss => {
                frame.release();
                if self.gate.settle_detection(ticket) {
                    self.emit(CaptureEvent::NoFace { cycle });
                }
                None
            }
            Detection::Failed(e) => {
                frame.release();
                if self.gate.settle_detection(ticket) {
                    self.emit(CaptureEvent::DetectionFailed {
                        cycle,
                        error: e.to_string(),
                    });
                }
                None
            }
        }
    }

    async fn encode(&self, ticket: Ticket, frame: RawFrame) -> Option<Stage> {
        let cycle = ticket.cycle();
        let codec = self.codec;
        let result = tokio::task::spawn_blocking(move || {
            let encoded = codec.encode(&frame);
            frame.release();
            encoded
        })
        .await
        .unwrap_or_else(|e| Err(Error::ConversionFailed(format!("encoder task failed: {e}"))));

        match result {
            Ok(image) => {
                self.emit(CaptureEvent::Encoded {
                    cycle,
                    bytes: image.len(),
                });
                Some(Stage::Acknowledge { ticket, image })
            }
            Err(e) => {
                tracing::warn!(cycle, error = %e, "capture abandoned, frame could not be encoded");
                self.emit(CaptureEvent::EncodeFailed {
                    cycle,
                    error: e.to_string(),
                });
                if self.gate.finish_capture(ticket) {
                    self.show(CaptureState::Disarmed);
                    self.emit(CaptureEvent::Disarmed { cycle });
                    self.emit(CaptureEvent::CycleFinished { cycle });
                }
                None
            }
        }
    }

    async fn acknowledge(&self, ticket: Ticket, image: EncodedImage) -> Option<Stage> {
        if !self.gate.is_capturing(ticket) {
            tracing::debug!(cycle = ticket.cycle(), "capture abandoned before cue");
            return None;
        }
        let outcome = self
            .playback
            .play(PlaybackRequest::LocalCue(CueKind::Capture))
            .await;
        if outcome == PlaybackOutcome::Failed {
            tracing::warn!(cycle = ticket.cycle(), "capture cue failed, uploading anyway");
        }
        Some(Stage::Upload { ticket, image })
    }

    async fn upload(&self, ticket: Ticket, image: EncodedImage) -> Option<Stage> {
        let cycle = ticket.cycle();
        if !self.gate.is_capturing(ticket) {
            tracing::debug!(cycle, "capture abandoned before upload");
            return None;
        }

        let reply = self.uploader.upload(image).await;
        match &reply {
            Ok(audio) => self.emit(CaptureEvent::Uploaded {
                cycle,
                audio_bytes: audio.len(),
            }),
            Err(e) => {
                tracing::warn!(cycle, error = %e, "upload failed");
                self.emit(CaptureEvent::UploadFailed {
                    cycle,
                    error: e.to_string(),
                });
            }
        }
        Some(Stage::Respond { ticket, reply })
    }

    async fn respond(&self, ticket: Ticket, reply: Result<Vec<u8>>) {
        let cycle = ticket.cycle();
        if !self.gate.finish_capture(ticket) {
            tracing::debug!(cycle, "reply for abandoned capture not played");
            return;
        }
        self.show(CaptureState::Disarmed);
        self.emit(CaptureEvent::Disarmed { cycle });

        let request = match reply {
            Ok(audio) => PlaybackRequest::RemoteAudio(audio),
            Err(_) => PlaybackRequest::LocalCue(CueKind::Error),
        };
        let outcome = self.playback.play(request).await;
        tracing::debug!(cycle, ?outcome, "capture cycle finished");
        self.emit(CaptureEvent::CycleFinished { cycle });
    }

    /// Stop the camera after a disarm or close, announcing it if the gate moved
    fn released(&self, disarmed: bool) {
        self.camera.stop();
        if disarmed {
            let cycle = self.gate.snapshot().cycle;
            self.show(CaptureState::Disarmed);
            self.emit(CaptureEvent::Disarmed { cycle });
            tracing::info!(cycle, "disarmed");
        }
    }

    fn show(&self, state: CaptureState) {
        if let Some(led) = &self.indicator {
            led.show(state);
        }
    }

    fn emit(&self, event: CaptureEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
