//! Playback controller
//!
//! Owns the single active playback. A new request stops whatever is playing
//! and takes over the device; nothing is queued. Received audio is written
//! to a temporary file that lives exactly as long as its playback.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tokio::sync::watch;

use super::cues::{CueKind, CueLibrary};
use super::output::{AudioOutput, AudioSource, StopSignal};
use crate::Result;

/// Prefix for temporary reply files
const REPLY_PREFIX: &str = "lookout-reply-";

/// Something to play
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackRequest {
    /// A bundled feedback cue
    LocalCue(CueKind),
    /// Audio bytes returned by the endpoint
    RemoteAudio(Vec<u8>),
}

impl PlaybackRequest {
    fn label(&self) -> &'static str {
        match self {
            Self::LocalCue(CueKind::Capture) => "capture_cue",
            Self::LocalCue(CueKind::Error) => "error_cue",
            Self::RemoteAudio(_) => "remote_audio",
        }
    }
}

/// How a playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Played to the end
    Completed,
    /// Stopped by a newer request, `stop`, or shutdown
    Superseded,
    /// Temp file or device failure; already logged
    Failed,
}

#[derive(Debug)]
struct ActivePlayback {
    id: u64,
    stop: StopSignal,
}

/// Counts a playback from request until its resources are gone
struct Pending(Arc<watch::Sender<usize>>);

impl Pending {
    fn enter(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(Arc::clone(counter))
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Serializes cue and reply playback on one output
pub struct PlaybackController {
    output: Arc<dyn AudioOutput>,
    cues: CueLibrary,
    temp_dir: PathBuf,
    active: Mutex<Option<ActivePlayback>>,
    device: Arc<tokio::sync::Mutex<()>>,
    next_id: AtomicU64,
    pending: Arc<watch::Sender<usize>>,
    closed: AtomicBool,
}

impl PlaybackController {
    /// Create a controller writing reply audio under `temp_dir`
    #[must_use]
    pub fn new(output: Arc<dyn AudioOutput>, cues: CueLibrary, temp_dir: PathBuf) -> Self {
        Self {
            output,
            cues,
            temp_dir,
            active: Mutex::new(None),
            device: Arc::new(tokio::sync::Mutex::new(())),
            next_id: AtomicU64::new(1),
            pending: Arc::new(watch::channel(0).0),
            closed: AtomicBool::new(false),
        }
    }

    /// Whether a playback currently holds the active slot
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Play a request, stopping any active playback first
    ///
    /// Resolves when this playback ends. Errors are logged and reported as
    /// [`PlaybackOutcome::Failed`]; they never propagate.
    pub async fn play(&self, request: PlaybackRequest) -> PlaybackOutcome {
        let kind = request.label();
        let pending = Pending::enter(&self.pending);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stop = StopSignal::new();
        if let Some(previous) = self.active.lock().replace(ActivePlayback {
            id,
            stop: stop.clone(),
        }) {
            tracing::debug!(previous = previous.id, id, "superseding playback");
            previous.stop.stop();
        }

        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!(kind, "playback controller closed, dropping request");
            self.clear(id);
            return PlaybackOutcome::Superseded;
        }

        let (source, reply_file) = match request {
            PlaybackRequest::LocalCue(cue) => (self.cues.source(cue).clone(), None),
            PlaybackRequest::RemoteAudio(bytes) => match self.stage_reply(&bytes) {
                Ok(file) => (AudioSource::File(file.path().to_path_buf()), Some(file)),
                Err(e) => {
                    tracing::error!(error = %e, "failed to stage reply audio");
                    self.clear(id);
                    return PlaybackOutcome::Failed;
                }
            },
        };

        // Wait for the previous playback to let go of the device
        let device = Arc::clone(&self.device).lock_owned().await;
        if stop.is_stopped() {
            drop(reply_file);
            self.clear(id);
            return PlaybackOutcome::Superseded;
        }

        tracing::debug!(id, kind, "playback started");
        let output = Arc::clone(&self.output);
        let signal = stop.clone();
        let result = tokio::task::spawn_blocking(move || {
            let result = output.play(&source, &signal);
            // Reply file goes away with the playback, even if the caller is gone
            drop(reply_file);
            drop(device);
            drop(pending);
            result
        })
        .await;

        self.clear(id);

        match result {
            Ok(Ok(())) if stop.is_stopped() => {
                tracing::debug!(id, kind, "playback stopped");
                PlaybackOutcome::Superseded
            }
            Ok(Ok(())) => {
                tracing::debug!(id, kind, "playback finished");
                PlaybackOutcome::Completed
            }
            Ok(Err(e)) => {
                tracing::warn!(id, kind, error = %e, "playback failed");
                PlaybackOutcome::Failed
            }
            Err(e) => {
                tracing::error!(id, kind, error = %e, "playback task panicked");
                PlaybackOutcome::Failed
            }
        }
    }

    /// Stop the active playback, if any
    pub fn stop(&self) {
        if let Some(active) = self.active.lock().as_ref() {
            active.stop.stop();
        }
    }

    /// Stop playback, refuse new requests, and wait until nothing is pending
    ///
    /// When this returns, every temporary reply file has been deleted.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.stop();
        let mut pending = self.pending.subscribe();
        if pending.wait_for(|n| *n == 0).await.is_err() {
            tracing::warn!("playback counter closed during shutdown");
        }
        tracing::debug!("playback controller shut down");
    }

    fn stage_reply(&self, bytes: &[u8]) -> Result<NamedTempFile> {
        use std::io::Write;

        let mut file = tempfile::Builder::new()
            .prefix(REPLY_PREFIX)
            .tempfile_in(&self.temp_dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        tracing::trace!(path = %file.path().display(), bytes = bytes.len(), "reply staged");
        Ok(file)
    }

    fn clear(&self, id: u64) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|a| a.id == id) {
            *active = None;
        }
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("temp_dir", &self.temp_dir)
            .field("playing", &self.is_playing())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::time::Duration;

    /// Output that blocks until stopped or `hold` elapses
    struct Held {
        hold: Duration,
        seen: Mutex<Vec<(AudioSource, bool)>>,
    }

    impl Held {
        fn new(hold: Duration) -> Self {
            Self {
                hold,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl AudioOutput for Held {
        fn play(&self, source: &AudioSource, stop: &StopSignal) -> Result<()> {
            let exists = match source {
                AudioSource::File(path) => path.exists(),
                AudioSource::Samples(_) => true,
            };
            self.seen.lock().push((source.clone(), exists));
            let start = std::time::Instant::now();
            while !stop.is_stopped() && start.elapsed() < self.hold {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        }
    }

    struct Broken;

    impl AudioOutput for Broken {
        fn play(&self, _source: &AudioSource, _stop: &StopSignal) -> Result<()> {
            Err(Error::Audio("no output device available".to_string()))
        }
    }

    fn controller(output: Arc<dyn AudioOutput>, dir: &std::path::Path) -> PlaybackController {
        PlaybackController::new(output, CueLibrary::default(), dir.to_path_buf())
    }

    fn reply_files(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_remote_audio_temp_file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let output = Arc::new(Held::new(Duration::ZERO));
        let playback = controller(output.clone(), dir.path());

        let outcome = playback.play(PlaybackRequest::RemoteAudio(vec![1; 4000])).await;
        assert_eq!(outcome, PlaybackOutcome::Completed);

        let seen = output.seen.lock();
        assert_eq!(seen.len(), 1);
        let (AudioSource::File(path), existed) = &seen[0] else {
            panic!("expected file source");
        };
        assert!(existed);
        assert!(path.starts_with(dir.path()));
        assert!(!path.exists());
        assert_eq!(reply_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_newest_request_wins() {
        let dir = tempfile::tempdir().unwrap();
        let playback = Arc::new(controller(
            Arc::new(Held::new(Duration::from_secs(10))),
            dir.path(),
        ));

        let first = tokio::spawn({
            let playback = Arc::clone(&playback);
            async move { playback.play(PlaybackRequest::RemoteAudio(vec![1; 16])).await }
        });
        while !playback.is_playing() {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = playback.play(PlaybackRequest::LocalCue(CueKind::Error));
        let stopper = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            playback.stop();
        };
        let (second, ()) = tokio::join!(second, stopper);

        assert_eq!(first.await.unwrap(), PlaybackOutcome::Superseded);
        assert_eq!(second, PlaybackOutcome::Superseded);
        assert_eq!(reply_files(dir.path()), 0);
        assert!(!playback.is_playing());
    }

    #[tokio::test]
    async fn test_device_failure_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let playback = controller(Arc::new(Broken), dir.path());

        let outcome = playback.play(PlaybackRequest::RemoteAudio(vec![1; 16])).await;
        assert_eq!(outcome, PlaybackOutcome::Failed);
        assert_eq!(reply_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_unwritable_temp_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let playback = controller(Arc::new(Held::new(Duration::ZERO)), &missing);

        let outcome = playback.play(PlaybackRequest::RemoteAudio(vec![1; 16])).await;
        assert_eq!(outcome, PlaybackOutcome::Failed);
        assert!(!playback.is_playing());
    }

    #[tokio::test]
    async fn test_shutdown_deletes_reply_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let playback = Arc::new(controller(
            Arc::new(Held::new(Duration::from_secs(10))),
            dir.path(),
        ));

        let task = tokio::spawn({
            let playback = Arc::clone(&playback);
            async move { playback.play(PlaybackRequest::RemoteAudio(vec![1; 16])).await }
        });
        while reply_files(dir.path()) == 0 {
            tokio::task::yield_now().await;
        }

        playback.shutdown().await;
        assert_eq!(reply_files(dir.path()), 0);
        assert_eq!(task.await.unwrap(), PlaybackOutcome::Superseded);

        let late = playback.play(PlaybackRequest::LocalCue(CueKind::Capture)).await;
        assert_eq!(late, PlaybackOutcome::Superseded);
    }
}
