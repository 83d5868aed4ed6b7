//! Native input collaborator seam.
//!
//! Capture sources do not talk to the OS directly; they drain an
//! [`InputSource`], which delivers the raw move/click/scroll/key
//! notifications of the underlying platform listener. The default
//! implementation is [`ChannelSource`], which any platform glue (or a
//! test) can feed through its [`InputInjector`] handle. On Linux an
//! `evdev`-backed implementation is available behind the `native-input`
//! feature.

pub mod channel;

#[cfg(all(feature = "native-input", target_os = "linux"))]
pub mod evdev;

pub use channel::{ChannelSource, InputInjector};

#[cfg(all(feature = "native-input", target_os = "linux"))]
pub use self::evdev::EvdevSource;

use crate::error::Result;
use std::time::Duration;

/// Mouse button identity as reported by the native listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    /// Any button outside the modeled taxonomy (middle, side, …).
    Other(u16),
}

/// One raw notification from a native input listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInput {
    /// Pointer moved to absolute screen position `(x, y)`.
    Move { x: i32, y: i32 },
    /// Button state change at absolute screen position `(x, y)`.
    Button {
        x: i32,
        y: i32,
        button: MouseButton,
        pressed: bool,
    },
    /// Scroll by `(dx, dy)` with the pointer at `(x, y)`.
    Scroll { x: i32, y: i32, dx: i32, dy: i32 },
    /// Key state change. `down` may repeat-fire while a key is held.
    Key { code: i32, down: bool },
}

/// Blocking native input listener.
///
/// One capture source owns one `InputSource` and drains it from its
/// dedicated producer thread.
pub trait InputSource: Send {
    /// Listener name used in logs and startup errors.
    fn name(&self) -> &str;

    /// Acquire the underlying device or hook.
    ///
    /// Called on the orchestrating thread before the producer thread is
    /// spawned, so that an unavailable listener (e.g. permission denied)
    /// surfaces as a fatal startup error instead of a degraded run.
    fn open(&mut self) -> Result<()>;

    /// Wait up to `timeout` for the next notification.
    ///
    /// Returns `Ok(None)` when the timeout elapses with nothing to
    /// deliver; the producer loop uses this to observe its stop flag.
    fn poll(&mut self, timeout: Duration) -> Result<Option<RawInput>>;
}
