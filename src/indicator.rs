//! Status LED
//!
//! Mirrors the capture state on the red/green/blue sysfs LEDs. Blue means
//! watching, blinking green means a capture is being uploaded, dark means
//! disarmed. Write failures are logged and never propagate.

use std::path::PathBuf;

use crate::capture::CaptureState;

/// Blink period halves for the uploading indicator (milliseconds)
const BLINK_ON_MS: u32 = 200;
const BLINK_OFF_MS: u32 = 200;

/// Full brightness value
const BRIGHTNESS_ON: &str = "255";

/// One of the three sysfs LEDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
    Red,
    Green,
    Blue,
}

impl Led {
    const ALL: [Self; 3] = [Self::Red, Self::Green, Self::Blue];

    const fn name(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
        }
    }
}

/// sysfs-backed status LED driver
#[derive(Debug, Clone)]
pub struct StatusLed {
    root: PathBuf,
}

impl StatusLed {
    /// Drive LEDs under `root` (normally `/sys/class/leds`)
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Show a capture state
    pub fn show(&self, state: CaptureState) {
        tracing::trace!(?state, "updating status led");
        self.all_off();
        match state {
            CaptureState::Uploading => self.blink(Led::Green, BLINK_ON_MS, BLINK_OFF_MS),
            watching if watching.is_watching() => self.set(Led::Blue, true),
            _ => {}
        }
    }

    /// Switch every LED off
    pub fn all_off(&self) {
        for led in Led::ALL {
            self.write(led, "trigger", "none");
            self.set(led, false);
        }
    }

    /// Solid on or off
    pub fn set(&self, led: Led, on: bool) {
        self.write(led, "brightness", if on { BRIGHTNESS_ON } else { "0" });
    }

    /// Blink using the kernel timer trigger
    pub fn blink(&self, led: Led, on_ms: u32, off_ms: u32) {
        self.write(led, "trigger", "timer");
        self.write(led, "delay_on", &on_ms.to_string());
        self.write(led, "delay_off", &off_ms.to_string());
    }

    fn write(&self, led: Led, attribute: &str, value: &str) {
        let path = self.root.join(led.name()).join(attribute);
        if let Err(e) = std::fs::write(&path, value) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write led attribute");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sysfs() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for led in Led::ALL {
            std::fs::create_dir(dir.path().join(led.name())).unwrap();
        }
        dir
    }

    fn read(root: &Path, led: Led, attribute: &str) -> String {
        std::fs::read_to_string(root.join(led.name()).join(attribute)).unwrap()
    }

    #[test]
    fn test_armed_is_blue() {
        let dir = sysfs();
        let led = StatusLed::new(dir.path());
        led.show(CaptureState::Armed);

        assert_eq!(read(dir.path(), Led::Blue, "brightness"), "255");
        assert_eq!(read(dir.path(), Led::Green, "brightness"), "0");
        assert_eq!(read(dir.path(), Led::Red, "brightness"), "0");
    }

    #[test]
    fn test_watching_states_are_blue() {
        let dir = sysfs();
        let led = StatusLed::new(dir.path());
        for state in [CaptureState::Armed, CaptureState::AwaitingDetection] {
            led.show(CaptureState::Disarmed);
            led.show(state);
            assert_eq!(read(dir.path(), Led::Blue, "brightness"), "255", "{state:?}");
            assert_eq!(read(dir.path(), Led::Green, "trigger"), "none");
        }
    }

    #[test]
    fn test_uploading_blinks_green() {
        let dir = sysfs();
        let led = StatusLed::new(dir.path());
        led.show(CaptureState::Armed);
        led.show(CaptureState::Uploading);

        assert_eq!(read(dir.path(), Led::Green, "trigger"), "timer");
        assert_eq!(read(dir.path(), Led::Green, "delay_on"), "200");
        assert_eq!(read(dir.path(), Led::Green, "delay_off"), "200");
        assert_eq!(read(dir.path(), Led::Blue, "brightness"), "0");
    }

    #[test]
    fn test_disarmed_is_dark() {
        let dir = sysfs();
        let led = StatusLed::new(dir.path());
        led.show(CaptureState::Uploading);
        led.show(CaptureState::Disarmed);

        for l in Led::ALL {
            assert_eq!(read(dir.path(), l, "trigger"), "none");
            assert_eq!(read(dir.path(), l, "brightness"), "0");
        }
    }

    #[test]
    fn test_missing_sysfs_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        StatusLed::new(dir.path().join("absent")).show(CaptureState::Armed);
    }
}
