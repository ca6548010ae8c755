//! Frame source boundary
//!
//! The physical camera lives outside this crate. [`FrameSource`] is the
//! contract it fulfils; [`CameraFacade`] keeps start/stop idempotent and
//! makes sure exactly one frame handler is registered.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::frame::RawFrame;
use crate::{Error, Result};

/// Callback receiving each frame the source produces
pub type FrameHandler = Arc<dyn Fn(RawFrame) + Send + Sync>;

/// What the source should do when the handler falls behind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backpressure {
    /// Drop older frames, deliver only the most recent one
    #[default]
    KeepLatest,
}

/// External camera capability
pub trait FrameSource: Send + Sync {
    /// Install the frame handler
    ///
    /// # Errors
    ///
    /// Returns error if the source cannot accept the handler
    fn register(&self, handler: FrameHandler, backpressure: Backpressure) -> Result<()>;

    /// Start delivering frames
    ///
    /// # Errors
    ///
    /// Returns error if the camera cannot be opened
    fn start(&self) -> Result<()>;

    /// Stop delivering frames and release the camera
    fn stop(&self);
}

#[derive(Debug, Default)]
struct FacadeState {
    registered: bool,
    running: bool,
}

/// Lifecycle wrapper around a [`FrameSource`]
pub struct CameraFacade {
    source: Arc<dyn FrameSource>,
    state: Mutex<FacadeState>,
}

impl CameraFacade {
    /// Wrap a frame source
    #[must_use]
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self {
            source,
            state: Mutex::new(FacadeState::default()),
        }
    }

    /// Register the single frame handler, requesting keep-latest delivery
    ///
    /// # Errors
    ///
    /// Returns error if a handler was already registered or the source refuses it
    pub fn register(&self, handler: FrameHandler) -> Result<()> {
        let mut state = self.state.lock();
        if state.registered {
            return Err(Error::Camera("frame handler already registered".to_string()));
        }
        self.source.register(handler, Backpressure::KeepLatest)?;
        state.registered = true;
        Ok(())
    }

    /// Start the camera if it is not running
    ///
    /// # Errors
    ///
    /// Returns error if the source fails to start
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.registered {
            return Err(Error::Camera("no frame handler registered".to_string()));
        }
        if state.running {
            return Ok(());
        }
        self.source.start()?;
        state.running = true;
        tracing::debug!("camera started");
        Ok(())
    }

    /// Stop the camera if it is running
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if state.running {
            self.source.stop();
            state.running = false;
            tracing::debug!("camera stopped");
        }
    }

    /// Whether the camera is delivering frames
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

impl std::fmt::Debug for CameraFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CameraFacade")
            .field("registered", &state.registered)
            .field("running", &state.running)
            .finish_non_exhaustive()
    }
}
