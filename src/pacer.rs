use crate::clock::Clock;
use std::time::Duration;

/// Absolute-schedule frame pacer.
///
/// Pacing is anchored to `start + i / fps` rather than "sleep one period
/// after each frame": if producing frame *i* overruns its slot, the next
/// sleep shrinks (or disappears) by exactly the overrun, so latency never
/// accumulates across a run. Frames are never scheduled early.
pub struct FramePacer {
    fps: f64,
    start_time: f64,
    frame_count: u64,
}

impl FramePacer {
    /// Anchor the schedule at the clock's current time.
    pub fn new(fps: f64, clock: &dyn Clock) -> Self {
        debug_assert!(fps > 0.0);
        Self {
            fps,
            start_time: clock.now(),
            frame_count: 0,
        }
    }

    /// Record that one frame has been produced and return how long to
    /// sleep before producing the next one.
    pub fn frame_completed(&mut self, clock: &dyn Clock) -> Duration {
        self.frame_count += 1;
        let target_time = self.start_time + self.frame_count as f64 / self.fps;
        let remaining = target_time - clock.now();
        if remaining > 0.0 {
            Duration::from_secs_f64(remaining)
        } else {
            Duration::ZERO
        }
    }

    /// Ideal timestamp of the next frame.
    pub fn next_target(&self) -> f64 {
        self.start_time + (self.frame_count + 1) as f64 / self.fps
    }

    /// Frames produced so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Schedule anchor.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::MockClock;

    #[test]
    fn test_sleep_fills_remaining_slot() {
        let clock = MockClock::new(0.0);
        let mut pacer = FramePacer::new(10.0, &clock);

        // Frame 0 took 30 ms of its 100 ms slot.
        clock.advance(0.03);
        let delay = pacer.frame_completed(&clock);
        assert!((delay.as_secs_f64() - 0.07).abs() < 1e-9);
    }

    #[test]
    fn test_overrun_shortens_next_sleep_not_a_full_period() {
        let clock = MockClock::new(0.0);
        let mut pacer = FramePacer::new(10.0, &clock);

        // Frame 0 overruns its slot by 50 ms: no sleep before frame 1.
        clock.advance(0.15);
        assert_eq!(pacer.frame_completed(&clock), Duration::ZERO);

        // Frame 1 is instantaneous; the next sleep is the 50 ms left until
        // target t=0.2, shortened by the overrun rather than a full period.
        let delay = pacer.frame_completed(&clock);
        assert!((delay.as_secs_f64() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_schedule_tracks_ideal_times_over_long_run() {
        let fps = 25.0;
        let period = 1.0 / fps;
        let clock = MockClock::new(1000.0);
        let mut pacer = FramePacer::new(fps, &clock);

        for i in 0..100u64 {
            let produced_at = clock.now();
            let ideal = 1000.0 + i as f64 * period;
            assert!(
                (produced_at - ideal).abs() < period,
                "frame {} drifted: produced at {}, ideal {}",
                i,
                produced_at,
                ideal
            );

            // Uneven processing: every 7th frame overruns its slot.
            let processing = if i % 7 == 0 { period * 1.5 } else { period * 0.2 };
            clock.advance(processing);
            let delay = pacer.frame_completed(&clock);
            clock.advance(delay.as_secs_f64());
        }
    }

    #[test]
    fn test_frames_are_never_scheduled_early() {
        let clock = MockClock::new(0.0);
        let mut pacer = FramePacer::new(4.0, &clock);

        for _ in 0..20 {
            let delay = pacer.frame_completed(&clock);
            clock.advance(delay.as_secs_f64());
            assert!(clock.now() + 1e-9 >= pacer.next_target() - 0.25);
        }
        // After 20 instantly-produced frames the clock sits exactly on the
        // schedule, not ahead of it.
        assert!((clock.now() - 5.0).abs() < 1e-9);
    }
}
