use super::{InputSource, RawInput};
use crate::error::Result;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::debug;

/// Channel-backed input source.
///
/// The platform-neutral default: whatever process-level glue receives the
/// OS callbacks pushes them through the [`InputInjector`], and the capture
/// source drains them here. Also the natural seam for tests and demos.
pub struct ChannelSource {
    name: String,
    receiver: Receiver<RawInput>,
}

/// Producer handle paired with a [`ChannelSource`].
///
/// Cloneable; dropping every injector simply leaves the source idle until
/// its recorder is stopped.
#[derive(Clone)]
pub struct InputInjector {
    sender: Sender<RawInput>,
}

impl ChannelSource {
    /// Create a source and its paired injector.
    pub fn new<S: Into<String>>(name: S) -> (Self, InputInjector) {
        let (sender, receiver) = channel::unbounded();
        (
            Self {
                name: name.into(),
                receiver,
            },
            InputInjector { sender },
        )
    }
}

impl InputInjector {
    /// Deliver one raw notification. Silently ignored once the paired
    /// source has been dropped.
    pub fn inject(&self, input: RawInput) {
        let _ = self.sender.send(input);
    }
}

impl InputSource for ChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<()> {
        debug!("Channel input source '{}' ready", self.name);
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<RawInput>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(input) => Ok(Some(input)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            // All injectors gone: stay idle until the recorder is stopped.
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MouseButton;

    #[test]
    fn test_injected_events_are_delivered_in_order() {
        let (mut source, injector) = ChannelSource::new("test");
        source.open().unwrap();

        injector.inject(RawInput::Move { x: 1, y: 2 });
        injector.inject(RawInput::Button {
            x: 1,
            y: 2,
            button: MouseButton::Left,
            pressed: true,
        });

        assert_eq!(
            source.poll(Duration::from_millis(10)).unwrap(),
            Some(RawInput::Move { x: 1, y: 2 })
        );
        assert!(matches!(
            source.poll(Duration::from_millis(10)).unwrap(),
            Some(RawInput::Button { pressed: true, .. })
        ));
    }

    #[test]
    fn test_poll_times_out_when_idle() {
        let (mut source, _injector) = ChannelSource::new("test");
        assert_eq!(source.poll(Duration::from_millis(5)).unwrap(), None);
    }

    #[test]
    fn test_disconnected_injector_is_not_an_error() {
        let (mut source, injector) = ChannelSource::new("test");
        drop(injector);
        assert_eq!(source.poll(Duration::from_millis(5)).unwrap(), None);
    }
}
