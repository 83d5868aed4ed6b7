use std::sync::atomic::{AtomicI32, Ordering};

/// Last observed pointer position, shared between the pointer capture
/// thread (writer) and the screen capture thread (reader).
#[derive(Debug)]
pub struct CursorState {
    x: AtomicI32,
    y: AtomicI32,
}

impl CursorState {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x: AtomicI32::new(x),
            y: AtomicI32::new(y),
        }
    }

    pub fn store(&self, x: i32, y: i32) {
        self.x.store(x, Ordering::Relaxed);
        self.y.store(y, Ordering::Relaxed);
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x.load(Ordering::Relaxed), self.y.load(Ordering::Relaxed))
    }
}

impl Default for CursorState {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Capture window in screen coordinates, always fully contained within
/// `[0, screen_width) × [0, screen_height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionWindow {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl RegionWindow {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Pointer-following capture window tracker.
///
/// Each tick recomputes the window from scratch around the current pointer
/// position; there is no smoothing or hysteresis between ticks. Near a
/// screen edge the anchor point is re-centered instead of clipping the
/// window asymmetrically, so the window stays rectangular and keeps
/// following the pointer until the pointer itself reaches the edge. A
/// radius larger than the screen degenerates to full-screen capture.
#[derive(Debug, Clone, Copy)]
pub struct RegionTracker {
    radius: (u32, u32),
    screen: (u32, u32),
}

impl RegionTracker {
    pub fn new(capture_radius: (u32, u32), screen_size: (u32, u32)) -> Self {
        Self {
            radius: capture_radius,
            screen: screen_size,
        }
    }

    /// Compute the capture window for pointer position `(mx, my)`.
    pub fn window_for(&self, mx: i32, my: i32) -> RegionWindow {
        let (rx, ry) = (self.radius.0 as i64, self.radius.1 as i64);
        let (w, h) = (self.screen.0 as i64, self.screen.1 as i64);

        let cx = clamp(mx as i64, rx, w - rx);
        let cy = clamp(my as i64, ry, h - ry);

        RegionWindow {
            left: clamp(cx - rx, 0, w) as u32,
            top: clamp(cy - ry, 0, h) as u32,
            right: clamp(cx + rx, 0, w) as u32,
            bottom: clamp(cy + ry, 0, h) as u32,
        }
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.screen
    }
}

/// Clamp with the upper bound winning when the bounds cross (radius wider
/// than the screen), matching the saturating behavior the window formula
/// relies on.
fn clamp(value: i64, lo: i64, hi: i64) -> i64 {
    value.max(lo).min(hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_near_origin_corner() {
        let tracker = RegionTracker::new((100, 40), (800, 600));
        let window = tracker.window_for(10, 10);
        assert_eq!(
            window,
            RegionWindow {
                left: 0,
                top: 0,
                right: 200,
                bottom: 80
            }
        );
        assert_eq!(window.width(), 200);
        assert_eq!(window.height(), 80);
    }

    #[test]
    fn test_window_near_far_corner() {
        let tracker = RegionTracker::new((100, 40), (800, 600));
        let window = tracker.window_for(790, 590);
        assert_eq!(window.right, 800);
        assert_eq!(window.bottom, 600);
        assert_eq!(window.left, 600);
        assert_eq!(window.top, 520);
    }

    #[test]
    fn test_window_centered_away_from_edges() {
        let tracker = RegionTracker::new((100, 40), (800, 600));
        let window = tracker.window_for(400, 300);
        assert_eq!(
            window,
            RegionWindow {
                left: 300,
                top: 260,
                right: 500,
                bottom: 340
            }
        );
    }

    #[test]
    fn test_radius_larger_than_screen_captures_everything() {
        let tracker = RegionTracker::new((5000, 3000), (1920, 1080));
        for (mx, my) in [(0, 0), (960, 540), (1919, 1079), (-50, 9999)] {
            let window = tracker.window_for(mx, my);
            assert_eq!(
                window,
                RegionWindow {
                    left: 0,
                    top: 0,
                    right: 1920,
                    bottom: 1080
                }
            );
        }
    }

    #[test]
    fn test_pointer_outside_screen_is_clamped() {
        let tracker = RegionTracker::new((100, 40), (800, 600));
        assert_eq!(tracker.window_for(-500, -500), tracker.window_for(0, 0));
        assert_eq!(
            tracker.window_for(10_000, 10_000),
            tracker.window_for(799, 599)
        );
    }

    #[test]
    fn test_window_always_inside_screen() {
        let tracker = RegionTracker::new((64, 64), (640, 480));
        for mx in (-100..740).step_by(37) {
            for my in (-100..580).step_by(41) {
                let w = tracker.window_for(mx, my);
                assert!(w.left <= w.right && w.right <= 640);
                assert!(w.top <= w.bottom && w.bottom <= 480);
            }
        }
    }

    #[test]
    fn test_cursor_state_round_trip() {
        let cursor = CursorState::default();
        cursor.store(123, -4);
        assert_eq!(cursor.position(), (123, -4));
    }
}
