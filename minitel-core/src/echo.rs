//! Echo Filter: drops inbound bytes that are a reflection of our own output.
//!
//! The terminal ends every reflected line with the CR we sent, so a reflected
//! line arrives as a line of its own and must equal a whole line of what was
//! written. The only reflection that can run into real typing is the
//! unterminated tail of the output (the prompt), which is stripped as a
//! prefix. A whole line shorter than `min_match` is treated as genuine input.

use minitel_io::is_line_break;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

pub const DEFAULT_LOOKBACK: usize = 256;
pub const DEFAULT_MIN_MATCH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoSettings {
    pub enabled: bool,
    /// Bytes of recent output kept for comparison.
    pub lookback: usize,
    /// Shortest whole line accepted as echo.
    pub min_match: usize,
}

impl Default for EchoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            lookback: DEFAULT_LOOKBACK,
            min_match: DEFAULT_MIN_MATCH,
        }
    }
}

#[derive(Debug)]
pub struct EchoFilter {
    settings: EchoSettings,
    window: VecDeque<u8>,
    stripped: usize,
}

impl EchoFilter {
    pub fn new(settings: EchoSettings) -> Self {
        Self {
            settings,
            window: VecDeque::with_capacity(settings.lookback),
            stripped: 0,
        }
    }

    pub fn settings(&self) -> EchoSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: EchoSettings) {
        self.settings = settings;
        self.trim();
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// Total inbound bytes removed as echo since creation.
    pub fn stripped(&self) -> usize {
        self.stripped
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn record_sent(&mut self, bytes: &[u8]) {
        self.window.extend(bytes.iter().copied());
        self.trim();
    }

    fn trim(&mut self) {
        let excess = self.window.len().saturating_sub(self.settings.lookback);
        self.window.drain(..excess);
    }

    /// Returns `inbound` with any reflected part removed.
    pub fn filter(&mut self, inbound: &[u8]) -> Vec<u8> {
        if !self.settings.enabled || inbound.is_empty() || self.window.is_empty() {
            return inbound.to_vec();
        }

        let min_match = self.settings.min_match.max(1);
        let window = self.window.make_contiguous();
        let found = whole_line(window, inbound, min_match)
            .map(|end| (end, inbound.len()))
            .or_else(|| unterminated_tail(window, inbound));

        match found {
            Some((end, len)) => {
                debug!("Echo: stripped {} reflected byte(s)", len);
                self.window.drain(..end);
                self.stripped += len;
                inbound[len..].to_vec()
            }
            None => {
                debug!(
                    "Echo: {} byte(s) not a reflection (min {}), kept as input",
                    inbound.len(),
                    min_match
                );
                inbound.to_vec()
            }
        }
    }
}

/// End offset of the oldest terminated line of `window` equal to `inbound`.
fn whole_line(window: &[u8], inbound: &[u8], min_match: usize) -> Option<usize> {
    let len = inbound.len();
    if len < min_match || len >= window.len() {
        return None;
    }
    window.windows(len).enumerate().find_map(|(pos, w)| {
        let end = pos + len;
        let starts_line = pos == 0 || is_line_break(window[pos - 1]);
        let ends_line = end < window.len() && is_line_break(window[end]);
        (w == inbound && starts_line && ends_line).then_some(end)
    })
}

/// The window's unterminated last line, when `inbound` starts with it.
fn unterminated_tail(window: &[u8], inbound: &[u8]) -> Option<(usize, usize)> {
    let start = window
        .iter()
        .rposition(|&b| is_line_break(b))
        .map_or(0, |i| i + 1);
    let tail = &window[start..];
    (!tail.is_empty() && inbound.starts_with(tail)).then_some((window.len(), tail.len()))
}

impl Default for EchoFilter {
    fn default() -> Self {
        Self::new(EchoSettings::default())
    }
}
