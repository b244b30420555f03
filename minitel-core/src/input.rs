//! Operator input: single keypresses and assembled lines.

use minitel_io::{Link, LinkError};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

const CR: u8 = 0x0d;
const LF: u8 = 0x0a;
const BS: u8 = 0x08;
const DEL: u8 = 0x7f;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A terminated line, terminator excluded.
    Line(Vec<u8>),
    /// The idle timeout passed; the partial line is kept.
    Idle,
}

#[derive(Debug)]
pub struct InputReader {
    mask: u8,
    trace: bool,
    after_cr: bool,
    partial: Vec<u8>,
}

impl InputReader {
    /// `mask` is applied to every inbound byte (0x7f strips a parity bit).
    pub fn new(mask: u8) -> Self {
        Self {
            mask,
            trace: false,
            after_cr: false,
            partial: Vec::new(),
        }
    }

    pub fn set_trace(&mut self, on: bool) {
        self.trace = on;
    }

    fn next_byte<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        timeout: Duration,
    ) -> Result<Option<u8>, LinkError> {
        let Some(raw) = link.read_byte(timeout)? else {
            return Ok(None);
        };
        let byte = raw & self.mask;
        if self.trace {
            let shown = if (0x20..0x7f).contains(&byte) {
                char::from(byte)
            } else {
                '.'
            };
            info!(target: "minitel::rx", "RX 0x{:02x} {}", raw, shown);
        }
        Ok(Some(byte))
    }

    /// One keypress. An LF completing a CR LF pair is not a keypress.
    pub fn read_key<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        timeout: Duration,
    ) -> Result<Option<u8>, LinkError> {
        loop {
            let Some(byte) = self.next_byte(link, timeout)? else {
                return Ok(None);
            };
            let was_cr = std::mem::replace(&mut self.after_cr, byte == CR);
            if was_cr && byte == LF {
                continue;
            }
            return Ok(Some(byte));
        }
    }

    /// Assemble a line, echoing keystrokes back when `local_echo` is set.
    pub fn read_line<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        idle_timeout: Duration,
        local_echo: bool,
    ) -> Result<LineRead, LinkError> {
        loop {
            let Some(byte) = self.read_key(link, idle_timeout)? else {
                return Ok(LineRead::Idle);
            };

            match byte {
                CR | LF => return Ok(LineRead::Line(std::mem::take(&mut self.partial))),
                BS | DEL => {
                    if self.partial.pop().is_some() && local_echo {
                        link.write_bytes(&[BS, b' ', BS])?;
                    }
                }
                0x20..=0x7e | 0xa0..=0xff => {
                    self.partial.push(byte);
                    if local_echo {
                        link.write_bytes(&[byte])?;
                    }
                }
                _ => {}
            }
        }
    }

    /// Forget any partial line and pending CR.
    pub fn reset(&mut self) {
        self.partial.clear();
        self.after_cr = false;
    }
}
