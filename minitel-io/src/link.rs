use crate::config::LinkConfig;
use crate::error::LinkError;
use std::time::Duration;

/// CR, LF, or form feed: the bytes that end a line on the terminal.
pub fn is_line_break(b: u8) -> bool {
    matches!(b, b'\r' | b'\n' | 0x0c)
}

/// The non-empty lines of `bytes`, split on [`is_line_break`].
pub fn lines_of(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    bytes
        .split(|&b| is_line_break(b))
        .filter(|line| !line.is_empty())
}

/// The capability every link variant provides.
///
/// Reads are byte-at-a-time with a deadline because the terminal has no
/// framing: the caller decides what a line or a keypress is.
pub trait Link: Send {
    /// Human-readable name of the device behind the link.
    fn name(&self) -> &str;

    /// Open (or reopen) the link with the given line settings.
    fn open(&mut self, config: &LinkConfig) -> Result<(), LinkError>;

    /// Wait up to `timeout` for one inbound byte. `Ok(None)` means the deadline passed.
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, LinkError>;

    /// Write every byte, or fail.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Discard anything already received (stale keypresses from a previous probe).
    fn drain_input(&mut self) -> Result<(), LinkError> {
        while self.read_byte(Duration::ZERO)?.is_some() {}
        Ok(())
    }
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn open(&mut self, config: &LinkConfig) -> Result<(), LinkError> {
        (**self).open(config)
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, LinkError> {
        (**self).read_byte(timeout)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        (**self).write_bytes(bytes)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn drain_input(&mut self) -> Result<(), LinkError> {
        (**self).drain_input()
    }
}
