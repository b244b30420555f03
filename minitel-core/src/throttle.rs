//! Throttled Writer: paces bytes and lines so a receiver without flow
//! control is never overrun.

use crate::text::encode_line;
use minitel_io::{Link, LinkError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_INTER_CHAR_DELAY_MS: u64 = 0;
pub const DEFAULT_INTER_LINE_DELAY_MS: u64 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottlePolicy {
    pub inter_char_delay_ms: u64,
    pub inter_line_delay_ms: u64,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            inter_char_delay_ms: DEFAULT_INTER_CHAR_DELAY_MS,
            inter_line_delay_ms: DEFAULT_INTER_LINE_DELAY_MS,
        }
    }
}

impl ThrottlePolicy {
    pub fn new(inter_char_delay_ms: u64, inter_line_delay_ms: u64) -> Self {
        Self {
            inter_char_delay_ms,
            inter_line_delay_ms,
        }
    }

    /// No pacing at all (simulated link, tests).
    pub fn immediate() -> Self {
        Self::new(0, 0)
    }

    pub fn char_delay(&self) -> Duration {
        Duration::from_millis(self.inter_char_delay_ms)
    }

    pub fn line_delay(&self) -> Duration {
        Duration::from_millis(self.inter_line_delay_ms)
    }

    /// Expected pacing for `lines` lines totalling `bytes` bytes.
    pub fn budget(&self, lines: usize, bytes: usize) -> Duration {
        self.line_delay() * lines as u32 + self.char_delay() * bytes as u32
    }
}

/// Where time goes between writes.
pub trait Pacer: Send {
    fn pause(&mut self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteProgress {
    pub lines: usize,
    pub bytes: usize,
}

#[derive(Debug, Error)]
#[error("transmission failed at line {line_index}, byte {byte_offset}: {source}")]
pub struct TransmissionFailure {
    pub line_index: usize,
    pub byte_offset: usize,
    #[source]
    pub source: LinkError,
}

pub struct ThrottledWriter<P: Pacer = ThreadPacer> {
    policy: ThrottlePolicy,
    pacer: P,
    total: WriteProgress,
    last: WriteProgress,
}

impl ThrottledWriter<ThreadPacer> {
    pub fn new(policy: ThrottlePolicy) -> Self {
        Self::with_pacer(policy, ThreadPacer)
    }
}

impl<P: Pacer> ThrottledWriter<P> {
    pub fn with_pacer(policy: ThrottlePolicy, pacer: P) -> Self {
        Self {
            policy,
            pacer,
            total: WriteProgress::default(),
            last: WriteProgress::default(),
        }
    }

    pub fn policy(&self) -> ThrottlePolicy {
        self.policy
    }

    /// Applies to the next write; nothing already sent is affected.
    pub fn set_policy(&mut self, policy: ThrottlePolicy) {
        self.policy = policy;
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    pub fn totals(&self) -> WriteProgress {
        self.total
    }

    /// Progress since the last `write_lines` call or `reset_progress`.
    pub fn last_progress(&self) -> WriteProgress {
        self.last
    }

    /// Encode and send one line, then wait the line delay.
    pub fn write_line<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        line: &str,
    ) -> Result<(), TransmissionFailure> {
        self.last = WriteProgress::default();
        self.send_line(link, 0, &encode_line(line))
    }

    pub fn write_lines<L: Link + ?Sized, S: AsRef<str>>(
        &mut self,
        link: &mut L,
        lines: &[S],
    ) -> Result<(), TransmissionFailure> {
        self.last = WriteProgress::default();
        for (index, line) in lines.iter().enumerate() {
            self.send_line(link, index, &encode_line(line.as_ref()))?;
        }
        Ok(())
    }

    /// Send a line that is already encoded (terminator included). Its index
    /// counts from the last `reset_progress`.
    pub fn write_encoded_line<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        bytes: &[u8],
    ) -> Result<(), TransmissionFailure> {
        let index = self.last.lines;
        self.send_line(link, index, bytes)
    }

    pub fn reset_progress(&mut self) {
        self.last = WriteProgress::default();
    }

    /// Bytes with no line terminator and no line delay.
    pub fn write_raw<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        bytes: &[u8],
    ) -> Result<(), TransmissionFailure> {
        self.send_bytes(link, 0, bytes)
    }

    fn send_line<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        index: usize,
        bytes: &[u8],
    ) -> Result<(), TransmissionFailure> {
        self.send_bytes(link, index, bytes)?;
        self.total.lines += 1;
        self.last.lines += 1;
        self.pacer.pause(self.policy.line_delay());
        Ok(())
    }

    fn send_bytes<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        index: usize,
        bytes: &[u8],
    ) -> Result<(), TransmissionFailure> {
        let fail = |offset: usize, source: LinkError| {
            warn!("Write failed at line {} byte {}: {}", index, offset, source);
            TransmissionFailure {
                line_index: index,
                byte_offset: offset,
                source,
            }
        };

        if self.policy.inter_char_delay_ms == 0 {
            link.write_bytes(bytes).map_err(|e| fail(0, e))?;
            self.count_bytes(bytes.len());
            return Ok(());
        }

        let delay = self.policy.char_delay();
        for (offset, byte) in bytes.iter().enumerate() {
            link.write_bytes(std::slice::from_ref(byte))
                .map_err(|e| fail(offset, e))?;
            self.count_bytes(1);
            self.pacer.pause(delay);
        }
        Ok(())
    }

    fn count_bytes(&mut self, n: usize) {
        self.total.bytes += n;
        self.last.bytes += n;
    }
}
