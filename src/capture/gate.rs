//! Capture gate
//!
//! Single source of truth for whether a frame may enter detection. Holds the
//! capture state and the throttle clock under one lock so the
//! check-then-act on each frame is atomic.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Minimum spacing between frames forwarded to detection
pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(1);

/// Service-wide capture state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// Not watching; frames are released untouched
    Disarmed,
    /// Watching; the next eligible frame goes to detection
    Armed,
    /// A frame is in detection; further frames are released
    AwaitingDetection,
    /// A face was captured; encode, cue, upload, and reply are under way
    Uploading,
}

impl CaptureState {
    /// Whether the state belongs to an active watch (armed or detecting)
    #[must_use]
    pub const fn is_watching(self) -> bool {
        matches!(self, Self::Armed | Self::AwaitingDetection)
    }
}

/// Snapshot identifying the capture cycle an async stage belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    cycle: u64,
}

impl Ticket {
    /// Cycle number this ticket was issued for
    #[must_use]
    pub const fn cycle(self) -> u64 {
        self.cycle
    }
}

/// Immutable view of the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSnapshot {
    /// Current state
    pub state: CaptureState,
    /// Current cycle number
    pub cycle: u64,
}

/// Gate decision for one incoming frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Send the frame to detection under this ticket
    Forward(Ticket),
    /// Not armed
    Disarmed,
    /// A classification or capture is already in flight
    Busy,
    /// Too soon after the last forwarded frame
    Throttled,
    /// Eligible, but the frame carries no image payload
    NoPayload,
}

/// Result of an arm signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// Transitioned from disarmed; a new cycle started
    Armed(Ticket),
    /// Already watching; throttle clock reset only
    AlreadyArmed,
    /// A capture is being uploaded or the gate is closed; signal ignored
    Ignored,
}

#[derive(Debug)]
struct GateState {
    state: CaptureState,
    cycle: u64,
    last_accepted: Option<Instant>,
    closed: bool,
}

/// Throttling and arming state machine
#[derive(Debug)]
pub struct CaptureGate {
    inner: Mutex<GateState>,
    min_interval: Duration,
}

impl Default for CaptureGate {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE)
    }
}

impl CaptureGate {
    /// Create a disarmed gate
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(GateState {
                state: CaptureState::Disarmed,
                cycle: 0,
                last_accepted: None,
                closed: false,
            }),
            min_interval,
        }
    }

    /// Current state and cycle
    #[must_use]
    pub fn snapshot(&self) -> GateSnapshot {
        let inner = self.inner.lock();
        GateSnapshot {
            state: inner.state,
            cycle: inner.cycle,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> CaptureState {
        self.inner.lock().state
    }

    /// Handle the arm signal
    ///
    /// Always clears the throttle clock when watching so the next frame is
    /// immediately eligible.
    pub fn arm(&self) -> ArmOutcome {
        let mut inner = self.inner.lock();
        if inner.closed {
            return ArmOutcome::Ignored;
        }
        match inner.state {
            CaptureState::Disarmed => {
                inner.cycle += 1;
                inner.state = CaptureState::Armed;
                inner.last_accepted = None;
                ArmOutcome::Armed(Ticket { cycle: inner.cycle })
            }
            CaptureState::Armed | CaptureState::AwaitingDetection => {
                inner.last_accepted = None;
                ArmOutcome::AlreadyArmed
            }
            CaptureState::Uploading => ArmOutcome::Ignored,
        }
    }

    /// Handle the disarm signal
    ///
    /// Returns false if already disarmed. Any ticket from the abandoned
    /// cycle is stale afterwards.
    pub fn disarm(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == CaptureState::Disarmed {
            return false;
        }
        inner.state = CaptureState::Disarmed;
        true
    }

    /// Disarm for good; every later arm is ignored
    ///
    /// Returns false if already disarmed.
    pub fn close(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.closed = true;
        std::mem::replace(&mut inner.state, CaptureState::Disarmed) != CaptureState::Disarmed
    }

    /// Whether [`close`](Self::close) was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Decide what to do with a frame arriving at `now`
    pub fn admit(&self, now: Instant, has_payload: bool) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            CaptureState::Disarmed => return Admission::Disarmed,
            CaptureState::AwaitingDetection | CaptureState::Uploading => return Admission::Busy,
            CaptureState::Armed => {}
        }

        if let Some(last) = inner.last_accepted
            && now.saturating_duration_since(last) < self.min_interval
        {
            return Admission::Throttled;
        }

        inner.last_accepted = Some(now);
        if !has_payload {
            return Admission::NoPayload;
        }

        inner.state = CaptureState::AwaitingDetection;
        Admission::Forward(Ticket { cycle: inner.cycle })
    }

    /// Detection finished without a capture; resume watching
    ///
    /// Returns false if the ticket is stale.
    pub fn settle_detection(&self, ticket: Ticket) -> bool {
        self.transition(ticket, CaptureState::AwaitingDetection, CaptureState::Armed)
    }

    /// Detection hit; take the capture
    ///
    /// Succeeds once per cycle. Returns false if the ticket is stale.
    pub fn begin_capture(&self, ticket: Ticket) -> bool {
        self.transition(ticket, CaptureState::AwaitingDetection, CaptureState::Uploading)
    }

    /// Capture cycle concluded (encode failure or upload settled)
    ///
    /// Returns false if the ticket is stale.
    pub fn finish_capture(&self, ticket: Ticket) -> bool {
        self.transition(ticket, CaptureState::Uploading, CaptureState::Disarmed)
    }

    /// Whether a ticket still owns the capture in progress
    #[must_use]
    pub fn is_capturing(&self, ticket: Ticket) -> bool {
        let inner = self.inner.lock();
        inner.cycle == ticket.cycle && inner.state == CaptureState::Uploading
    }

    fn transition(&self, ticket: Ticket, from: CaptureState, to: CaptureState) -> bool {
        let mut inner = self.inner.lock();
        if inner.cycle != ticket.cycle || inner.state != from {
            tracing::debug!(
                ticket = ticket.cycle,
                cycle = inner.cycle,
                state = ?inner.state,
                expected = ?from,
                "stale capture ticket"
            );
            return false;
        }
        inner.state = to;
        true
    }
}
