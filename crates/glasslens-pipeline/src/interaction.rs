//! Press, drag, and release handling for a movable lens.
//!
//! [`LensInteractionController`] tracks the lens position inside its
//! container and drives a small wobble animation:
//!
//! ```text
//! idle --press--> pressed --150ms--> dragWobble (3 pulses, 400ms apart)
//!   ^                 |                   |
//!   |               release            release
//!   |                 v                   v
//!   +--last pulse-- releaseWobble <--500ms-- released
//!        ends        (3 pulses, 500ms apart, 450ms each)
//! ```
//!
//! The controller never reads a clock or spawns timers. Callers pass the
//! current time (any monotonic origin) to [`press`](LensInteractionController::press),
//! [`release`](LensInteractionController::release), and
//! [`advance`](LensInteractionController::advance), and can ask for
//! [`next_deadline`](LensInteractionController::next_deadline) to know
//! when to call back. Every transition replaces the pending schedule, so a
//! stale deadline from an earlier press or release can never fire.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, Point, Vector};

/// Visible animation state, for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnimationPhase {
    /// At rest.
    #[default]
    Idle,
    /// Pointer is down, before the drag wobble starts.
    Pressed,
    /// Dragging, wobble pulses running or finished.
    DragWobble,
    /// Pointer released, before the release wobble starts.
    Released,
    /// Settling after release.
    ReleaseWobble,
}

impl AnimationPhase {
    /// Name used in reports and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pressed => "pressed",
            Self::DragWobble => "dragWobble",
            Self::Released => "released",
            Self::ReleaseWobble => "releaseWobble",
        }
    }
}

/// Delays and pulse counts for the wobble animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WobbleTiming {
    /// Delay from press to the first drag pulse.
    pub press_delay: Duration,
    /// Interval between drag pulses.
    pub drag_interval: Duration,
    /// Delay from release to the first release pulse.
    pub release_delay: Duration,
    /// Interval between release pulses.
    pub release_interval: Duration,
    /// How long each release pulse stays visible.
    pub release_pulse: Duration,
    /// Pulses per wobble.
    pub pulses: u32,
}

impl Default for WobbleTiming {
    fn default() -> Self {
        Self {
            press_delay: Duration::from_millis(150),
            drag_interval: Duration::from_millis(400),
            release_delay: Duration::from_millis(500),
            release_interval: Duration::from_millis(500),
            release_pulse: Duration::from_millis(450),
            pulses: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Pressed {
        wobble_at: Duration,
    },
    DragWobbling {
        remaining: u32,
        next_pulse: Option<Duration>,
    },
    Released {
        wobble_at: Duration,
    },
    ReleaseWobbling {
        remaining: u32,
        next_pulse: Option<Duration>,
        settle_at: Duration,
    },
}

/// Position and animation state of one draggable lens.
#[derive(Debug, Clone)]
pub struct LensInteractionController {
    position: Point,
    lens: Dimensions,
    grab_offset: Option<Vector>,
    state: State,
    timing: WobbleTiming,
    pulse: u64,
}

impl LensInteractionController {
    /// Top-left position of a newly placed lens.
    pub const DEFAULT_POSITION: Point = Point::new(180.0, 80.0);

    /// Create a controller for a lens of size `lens` at `position`.
    #[must_use]
    pub fn new(position: Point, lens: Dimensions) -> Self {
        Self {
            position,
            lens,
            grab_offset: None,
            state: State::Idle,
            timing: WobbleTiming::default(),
            pulse: 0,
        }
    }

    /// Replace the wobble timing.
    #[must_use]
    pub const fn with_timing(mut self, timing: WobbleTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Lens top-left in container coordinates.
    #[must_use]
    pub const fn position(&self) -> Point {
        self.position
    }

    /// Whether a drag is in progress.
    #[must_use]
    pub const fn is_dragging(&self) -> bool {
        self.grab_offset.is_some()
    }

    /// Number of wobble pulses started so far. Changes whenever the
    /// presentation layer should restart the wobble animation.
    #[must_use]
    pub const fn pulse(&self) -> u64 {
        self.pulse
    }

    /// Current animation phase.
    #[must_use]
    pub const fn phase(&self) -> AnimationPhase {
        match self.state {
            State::Idle => AnimationPhase::Idle,
            State::Pressed { .. } => AnimationPhase::Pressed,
            State::DragWobbling { .. } => AnimationPhase::DragWobble,
            State::Released { .. } => AnimationPhase::Released,
            State::ReleaseWobbling { .. } => AnimationPhase::ReleaseWobble,
        }
    }

    /// Time at which [`advance`](Self::advance) next changes something.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        match self.state {
            State::Idle => None,
            State::Pressed { wobble_at } | State::Released { wobble_at } => Some(wobble_at),
            State::DragWobbling { next_pulse, .. } => next_pulse,
            State::ReleaseWobbling {
                next_pulse,
                settle_at,
                ..
            } => Some(next_pulse.unwrap_or(settle_at)),
        }
    }

    /// Start a drag with the pointer at `pointer`.
    ///
    /// Cancels any pending release wobble.
    pub fn press(&mut self, pointer: Point, now: Duration) {
        self.grab_offset = Some(pointer.offset_from(self.position));
        self.state = State::Pressed {
            wobble_at: now.saturating_add(self.timing.press_delay),
        };
        tracing::trace!(?pointer, "lens pressed");
    }

    /// Move the lens so the grab point follows `pointer`, keeping it
    /// inside `container`. Returns the new position.
    ///
    /// Does nothing unless a drag is in progress. Each axis is clamped to
    /// `[0, container - lens]`, or pinned to 0 when the container is
    /// smaller than the lens.
    pub fn drag_to(&mut self, pointer: Point, container: Dimensions) -> Point {
        if let Some(offset) = self.grab_offset {
            let target = pointer.translate(-offset);
            self.position = Point::new(
                clamp_axis(target.x, container.width, self.lens.width),
                clamp_axis(target.y, container.height, self.lens.height),
            );
        }
        self.position
    }

    /// End the drag. Does nothing unless a drag is in progress.
    ///
    /// Cancels any pending drag wobble.
    pub fn release(&mut self, now: Duration) {
        if self.grab_offset.take().is_none() {
            return;
        }
        self.state = State::Released {
            wobble_at: now.saturating_add(self.timing.release_delay),
        };
        tracing::trace!(position = ?self.position, "lens released");
    }

    /// Process every deadline at or before `now`.
    ///
    /// Deadlines are handled at their scheduled times, so a late call
    /// catches up to the same state as timely calls would have.
    pub fn advance(&mut self, now: Duration) {
        while let Some(deadline) = self.next_deadline() {
            if deadline > now {
                break;
            }
            self.fire(deadline);
        }
    }

    /// Drop all pending work and return to idle, keeping the position.
    pub fn cancel(&mut self) {
        self.grab_offset = None;
        self.state = State::Idle;
    }

    fn fire(&mut self, at: Duration) {
        let timing = self.timing;
        self.state = match self.state {
            State::Idle => State::Idle,
            State::Pressed { .. } => self.drag_pulse(timing.pulses, at),
            State::DragWobbling { remaining, .. } => self.drag_pulse(remaining, at),
            State::Released { .. } => self.release_pulse(timing.pulses, at),
            State::ReleaseWobbling {
                remaining,
                next_pulse: Some(_),
                ..
            } => self.release_pulse(remaining, at),
            State::ReleaseWobbling {
                next_pulse: None, ..
            } => State::Idle,
        };
    }

    /// Start a drag pulse at `at` if any remain.
    fn drag_pulse(&mut self, remaining: u32, at: Duration) -> State {
        if remaining == 0 {
            return State::DragWobbling {
                remaining: 0,
                next_pulse: None,
            };
        }
        self.pulse += 1;
        let remaining = remaining - 1;
        State::DragWobbling {
            remaining,
            next_pulse: (remaining > 0).then(|| at.saturating_add(self.timing.drag_interval)),
        }
    }

    /// Start a release pulse at `at` if any remain, otherwise settle.
    fn release_pulse(&mut self, remaining: u32, at: Duration) -> State {
        if remaining == 0 {
            return State::ReleaseWobbling {
                remaining: 0,
                next_pulse: None,
                settle_at: at,
            };
        }
        self.pulse += 1;
        let remaining = remaining - 1;
        State::ReleaseWobbling {
            remaining,
            next_pulse: (remaining > 0).then(|| at.saturating_add(self.timing.release_interval)),
            settle_at: at.saturating_add(self.timing.release_pulse),
        }
    }
}

impl Default for LensInteractionController {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_POSITION,
            Dimensions {
                width: crate::LensParameters::DEFAULT_WIDTH,
                height: crate::LensParameters::DEFAULT_HEIGHT,
            },
        )
    }
}

fn clamp_axis(value: f64, container: u32, lens: u32) -> f64 {
    let limit = (f64::from(container) - f64::from(lens)).max(0.0);
    value.min(limit).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    const CONTAINER: Dimensions = Dimensions {
        width: 800,
        height: 600,
    };

    #[test]
    fn starts_idle_at_default_position() {
        let c = LensInteractionController::default();
        assert_eq!(c.phase(), AnimationPhase::Idle);
        assert_eq!(c.position(), Point::new(180.0, 80.0));
        assert_eq!(c.next_deadline(), None);
        assert!(!c.is_dragging());
    }

    #[test]
    fn press_then_drag_wobble_pulses() {
        let mut c = LensInteractionController::default();
        c.press(Point::new(200.0, 100.0), ms(0));
        assert_eq!(c.phase(), AnimationPhase::Pressed);
        assert_eq!(c.next_deadline(), Some(ms(150)));

        c.advance(ms(149));
        assert_eq!(c.phase(), AnimationPhase::Pressed);

        c.advance(ms(150));
        assert_eq!(c.phase(), AnimationPhase::DragWobble);
        assert_eq!(c.pulse(), 1);
        assert_eq!(c.next_deadline(), Some(ms(550)));

        c.advance(ms(950));
        assert_eq!(c.pulse(), 3);
        assert_eq!(c.next_deadline(), None);

        // The drag wobble phase holds until release.
        c.advance(ms(10_000));
        assert_eq!(c.phase(), AnimationPhase::DragWobble);
        assert_eq!(c.pulse(), 3);
    }

    #[test]
    fn release_wobble_settles_to_idle() {
        let mut c = LensInteractionController::default();
        c.press(Point::new(200.0, 100.0), ms(0));
        c.advance(ms(2_000));
        c.release(ms(2_000));
        assert_eq!(c.phase(), AnimationPhase::Released);
        assert!(!c.is_dragging());

        c.advance(ms(2_499));
        assert_eq!(c.phase(), AnimationPhase::Released);

        c.advance(ms(2_500));
        assert_eq!(c.phase(), AnimationPhase::ReleaseWobble);
        assert_eq!(c.pulse(), 4);

        c.advance(ms(3_000));
        assert_eq!(c.pulse(), 5);
        c.advance(ms(3_500));
        assert_eq!(c.pulse(), 6);

        // The last pulse stays visible for 450 ms.
        c.advance(ms(3_949));
        assert_eq!(c.phase(), AnimationPhase::ReleaseWobble);
        c.advance(ms(3_950));
        assert_eq!(c.phase(), AnimationPhase::Idle);
        assert_eq!(c.next_deadline(), None);
    }

    #[test]
    fn late_advance_catches_up() {
        let mut stepped = LensInteractionController::default();
        let mut late = LensInteractionController::default();
        for c in [&mut stepped, &mut late] {
            c.press(Point::new(190.0, 90.0), ms(0));
        }
        for t in (0..=1_000).step_by(10) {
            stepped.advance(ms(t));
        }
        late.advance(ms(1_000));
        assert_eq!(stepped.phase(), late.phase());
        assert_eq!(stepped.pulse(), late.pulse());
        assert_eq!(stepped.next_deadline(), late.next_deadline());
    }

    #[test]
    fn quick_release_skips_drag_wobble() {
        let mut c = LensInteractionController::default();
        c.press(Point::new(200.0, 100.0), ms(0));
        c.release(ms(100));
        c.advance(ms(150));
        assert_eq!(c.phase(), AnimationPhase::Released);
        assert_eq!(c.pulse(), 0);
        c.advance(ms(600));
        assert_eq!(c.phase(), AnimationPhase::ReleaseWobble);
        assert_eq!(c.pulse(), 1);
    }

    #[test]
    fn press_during_release_wobble_cancels_it() {
        let mut c = LensInteractionController::default();
        c.press(Point::new(200.0, 100.0), ms(0));
        c.release(ms(1_000));
        c.advance(ms(1_600));
        assert_eq!(c.phase(), AnimationPhase::ReleaseWobble);
        let pulses = c.pulse();

        c.press(Point::new(200.0, 100.0), ms(1_700));
        assert_eq!(c.phase(), AnimationPhase::Pressed);
        c.advance(ms(1_849));
        assert_eq!(c.phase(), AnimationPhase::Pressed);
        assert_eq!(c.pulse(), pulses);
        c.advance(ms(1_850));
        assert_eq!(c.phase(), AnimationPhase::DragWobble);
    }

    #[test]
    fn drag_follows_pointer_with_grab_offset() {
        let mut c = LensInteractionController::default();
        c.press(Point::new(200.0, 100.0), ms(0));
        let p = c.drag_to(Point::new(250.0, 130.0), CONTAINER);
        assert_eq!(p, Point::new(230.0, 110.0));
        assert_eq!(c.position(), p);
    }

    #[test]
    fn drag_clamps_to_container() {
        let mut c = LensInteractionController::default();
        c.press(Point::new(180.0, 80.0), ms(0));
        assert_eq!(
            c.drag_to(Point::new(5_000.0, 5_000.0), CONTAINER),
            Point::new(590.0, 450.0)
        );
        assert_eq!(
            c.drag_to(Point::new(-50.0, -50.0), CONTAINER),
            Point::new(0.0, 0.0)
        );
    }

    #[test]
    fn drag_pins_to_origin_in_small_container() {
        let mut c = LensInteractionController::default();
        c.press(Point::new(180.0, 80.0), ms(0));
        let small = Dimensions {
            width: 100,
            height: 100,
        };
        assert_eq!(
            c.drag_to(Point::new(300.0, 300.0), small),
            Point::new(0.0, 0.0)
        );
    }

    #[test]
    fn drag_without_press_does_nothing() {
        let mut c = LensInteractionController::default();
        assert_eq!(
            c.drag_to(Point::new(0.0, 0.0), CONTAINER),
            LensInteractionController::DEFAULT_POSITION
        );
        c.release(ms(0));
        assert_eq!(c.phase(), AnimationPhase::Idle);
    }

    #[test]
    fn cancel_drops_pending_work() {
        let mut c = LensInteractionController::default();
        c.press(Point::new(200.0, 100.0), ms(0));
        c.cancel();
        assert_eq!(c.phase(), AnimationPhase::Idle);
        assert_eq!(c.next_deadline(), None);
        c.advance(ms(10_000));
        assert_eq!(c.pulse(), 0);
        assert!(!c.is_dragging());
    }

    #[test]
    fn deadlines_saturate_at_the_end_of_time() {
        let mut c = LensInteractionController::default();
        c.press(Point::new(200.0, 100.0), Duration::MAX);
        assert_eq!(c.next_deadline(), Some(Duration::MAX));
        c.advance(Duration::MAX);
        assert_eq!(c.phase(), AnimationPhase::DragWobble);
        assert_eq!(c.pulse(), 3);

        c.release(Duration::MAX);
        c.advance(Duration::MAX);
        assert_eq!(c.phase(), AnimationPhase::Idle);
        assert_eq!(c.pulse(), 6);
    }

    #[test]
    fn zero_pulses_still_settles() {
        let timing = WobbleTiming {
            pulses: 0,
            ..WobbleTiming::default()
        };
        let mut c = LensInteractionController::default().with_timing(timing);
        c.press(Point::new(200.0, 100.0), ms(0));
        c.advance(ms(150));
        assert_eq!(c.phase(), AnimationPhase::DragWobble);
        c.release(ms(200));
        c.advance(ms(700));
        assert_eq!(c.phase(), AnimationPhase::Idle);
        assert_eq!(c.pulse(), 0);
    }

    #[test]
    fn phase_names_match_serialized_form() {
        for phase in [
            AnimationPhase::Idle,
            AnimationPhase::Pressed,
            AnimationPhase::DragWobble,
            AnimationPhase::Released,
            AnimationPhase::ReleaseWobble,
        ] {
            let json = serde_json::to_string(&phase).unwrap_or_default();
            assert_eq!(json, format!("\"{}\"", phase.label()));
        }
    }
}
