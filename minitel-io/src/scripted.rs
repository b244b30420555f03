//! An in-memory link that plays a scripted operator.
//!
//! Reads never block: an empty input queue behaves like an elapsed timeout
//! (or like a vanished peer, see [`ScriptedLink::eof_when_drained`]).

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::link::Link;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Trigger {
    needle: Vec<u8>,
    reply: Vec<u8>,
    open_index: Option<usize>,
}

#[derive(Debug, Default)]
pub struct ScriptedLink {
    input: VecDeque<u8>,
    triggers: Vec<Trigger>,
    written: Vec<u8>,
    writes: Vec<Vec<u8>>,
    opens: Vec<LinkConfig>,
    refused: Vec<LinkConfig>,
    unavailable: bool,
    reflect_writes: bool,
    eof_when_drained: bool,
    fail_after: Option<usize>,
    open: bool,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as if the operator had typed them.
    pub fn push_input(&mut self, bytes: &[u8]) -> &mut Self {
        self.input.extend(bytes.iter().copied());
        self
    }

    /// When a write contains `needle`, queue `reply` (once).
    pub fn respond_to(&mut self, needle: &[u8], reply: &[u8]) -> &mut Self {
        self.triggers.push(Trigger {
            needle: needle.to_vec(),
            reply: reply.to_vec(),
            open_index: None,
        });
        self
    }

    /// Like [`respond_to`](Self::respond_to) but only while the `n`th open (0-based) is active.
    pub fn respond_on_open(&mut self, n: usize, needle: &[u8], reply: &[u8]) -> &mut Self {
        self.triggers.push(Trigger {
            needle: needle.to_vec(),
            reply: reply.to_vec(),
            open_index: Some(n),
        });
        self
    }

    /// Every write is reflected back into the input queue (a local echo loop).
    pub fn reflect_writes(&mut self, on: bool) -> &mut Self {
        self.reflect_writes = on;
        self
    }

    /// Reads fail with [`LinkError::Closed`] once the input queue is empty.
    pub fn eof_when_drained(&mut self, on: bool) -> &mut Self {
        self.eof_when_drained = on;
        self
    }

    /// Writes fail once `n` bytes have gone out in total.
    pub fn fail_after_bytes(&mut self, n: usize) -> &mut Self {
        self.fail_after = Some(n);
        self
    }

    /// Every `open` fails.
    pub fn unavailable(&mut self, on: bool) -> &mut Self {
        self.unavailable = on;
        self
    }

    /// `open` fails for this particular line setting.
    pub fn refuse(&mut self, config: LinkConfig) -> &mut Self {
        self.refused.push(config);
        self
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn written_text(&self) -> String {
        self.written.iter().map(|&b| char::from(b)).collect()
    }

    /// One entry per `write_bytes` call.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// Every successful `open`, in order.
    pub fn opens(&self) -> &[LinkConfig] {
        &self.opens
    }

    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    /// Match needles against the newest bytes, so a needle split across
    /// byte-at-a-time writes still fires.
    fn fire_triggers(&mut self, new_bytes: usize) {
        let current_open = self.opens.len().checked_sub(1);
        let mut fired = Vec::new();
        for (i, t) in self.triggers.iter().enumerate() {
            let open_ok = t.open_index.is_none() || t.open_index == current_open;
            let start = self
                .written
                .len()
                .saturating_sub(new_bytes + t.needle.len().saturating_sub(1));
            if open_ok && contains(&self.written[start..], &t.needle) {
                fired.push(i);
            }
        }
        for i in fired.into_iter().rev() {
            let t = self.triggers.remove(i);
            self.input.extend(t.reply);
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

impl Link for ScriptedLink {
    fn name(&self) -> &str {
        "SCRIPTED"
    }

    fn open(&mut self, config: &LinkConfig) -> Result<(), LinkError> {
        let refused = self.refused.iter().any(|c| c.same_line(config));
        if self.unavailable || refused {
            return Err(LinkError::Unavailable {
                port: "SCRIPTED".to_string(),
                reason: format!("{} refused", config.label()),
            });
        }
        self.opens.push(*config);
        self.open = true;
        Ok(())
    }

    fn read_byte(&mut self, _timeout: Duration) -> Result<Option<u8>, LinkError> {
        if !self.open {
            return Err(LinkError::NotOpen);
        }
        match self.input.pop_front() {
            Some(b) => Ok(Some(b)),
            None if self.eof_when_drained => Err(LinkError::Closed),
            None => Ok(None),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if !self.open {
            return Err(LinkError::NotOpen);
        }
        if let Some(limit) = self.fail_after {
            if self.written.len() + bytes.len() > limit {
                let room = limit.saturating_sub(self.written.len());
                self.written.extend_from_slice(&bytes[..room]);
                return Err(LinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "scripted write failure",
                )));
            }
        }
        self.written.extend_from_slice(bytes);
        self.writes.push(bytes.to_vec());
        if self.reflect_writes {
            self.input.extend(bytes.iter().copied());
        }
        self.fire_triggers(bytes.len());
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn drain_input(&mut self) -> Result<(), LinkError> {
        if !self.open {
            return Err(LinkError::NotOpen);
        }
        self.input.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
