//! Link Probe: find a serial configuration the terminal actually understands.
//!
//! There is no handshake to rely on. Each candidate is opened in turn, a
//! readable test banner is sent, and a human at the terminal confirms the
//! one they can read by typing `y` then Enter.
//!
//! ```text
//! Idle -> Probing(i) -> AwaitingConfirmation(i) -> Confirmed
//!              ^                  |
//!              +---- next i ------+  (timeout / refusal)
//!                                 +-> Exhausted (list done)
//! ```

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::link::{Link, lines_of};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Keys accepted as "yes" (`o` for "oui").
pub const AFFIRMATIVE_KEYS: &[u8] = b"yYoO";

const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(6);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    Probing(usize),
    AwaitingConfirmation(usize),
    Confirmed(LinkConfig),
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// The winning configuration, with `confirmed` set.
    pub config: LinkConfig,
    /// 1-based cycle in which it was confirmed.
    pub cycle: usize,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    /// Nothing in the list was confirmed.
    #[error("no configuration confirmed after {cycles} cycle(s)")]
    Exhausted { cycles: usize },

    /// Not a single candidate could even be opened.
    #[error("link unavailable: {0}")]
    Unavailable(#[source] LinkError),

    #[error("empty candidate list")]
    NoCandidates,
}

enum Reply {
    Yes,
    No,
    Silence,
}

#[derive(Debug)]
pub struct LinkProbe {
    candidates: Vec<LinkConfig>,
    confirm_timeout: Duration,
    state: ProbeState,
    transitions: Vec<ProbeState>,
    tried: Vec<LinkConfig>,
}

impl Default for LinkProbe {
    fn default() -> Self {
        Self::new(LinkConfig::candidates())
    }
}

impl LinkProbe {
    pub fn new(candidates: Vec<LinkConfig>) -> Self {
        Self {
            candidates,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            state: ProbeState::Idle,
            transitions: vec![ProbeState::Idle],
            tried: Vec::new(),
        }
    }

    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    pub fn state(&self) -> &ProbeState {
        &self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn transitions(&self) -> &[ProbeState] {
        &self.transitions
    }

    /// Every candidate presented to the operator, across all cycles.
    pub fn tried(&self) -> &[LinkConfig] {
        &self.tried
    }

    pub fn candidates(&self) -> &[LinkConfig] {
        &self.candidates
    }

    fn enter(&mut self, state: ProbeState) {
        tracing::debug!("Probe state: {:?} -> {:?}", self.state, state);
        self.state = state.clone();
        self.transitions.push(state);
    }

    /// Run up to `max_cycles` full passes over the candidate list.
    pub fn run<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        max_cycles: usize,
    ) -> Result<ProbeOutcome, ProbeError> {
        let cycles = max_cycles.max(1);
        for cycle in 1..=cycles {
            tracing::info!("Probe cycle {}/{} on {}", cycle, cycles, link.name());
            match self.run_cycle(link) {
                Ok(config) => return Ok(ProbeOutcome { config, cycle }),
                Err(ProbeError::Exhausted { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ProbeError::Exhausted { cycles })
    }

    /// One pass over every candidate, in order, each exactly once.
    pub fn run_cycle<L: Link + ?Sized>(&mut self, link: &mut L) -> Result<LinkConfig, ProbeError> {
        if self.candidates.is_empty() {
            return Err(ProbeError::NoCandidates);
        }

        let mut opened_any = false;
        let mut last_open_error = None;

        for i in 0..self.candidates.len() {
            let candidate = self.candidates[i];
            self.enter(ProbeState::Probing(i));

            if let Err(e) = link.open(&candidate) {
                tracing::warn!("Probe: cannot open {}: {}", candidate.label(), e);
                last_open_error = Some(e);
                continue;
            }
            opened_any = true;
            self.tried.push(candidate);

            let reply = self.present(link, &candidate);
            match reply {
                Ok(Reply::Yes) => {
                    let confirmed = candidate.confirm();
                    let ack = format!("\r\nOK {}\r\n", confirmed.label());
                    if let Err(e) = link.write_bytes(ack.as_bytes()) {
                        tracing::warn!("Probe: cannot acknowledge {}: {}", confirmed.label(), e);
                    }
                    link.close();
                    tracing::info!("Probe: {} confirmed by operator", confirmed.label());
                    self.enter(ProbeState::Confirmed(confirmed));
                    return Ok(confirmed);
                }
                Ok(Reply::No) => tracing::info!("Probe: {} refused", candidate.label()),
                Ok(Reply::Silence) => tracing::info!("Probe: {} timed out", candidate.label()),
                Err(e) => tracing::warn!("Probe: {} failed: {}", candidate.label(), e),
            }
            link.close();
        }

        self.enter(ProbeState::Exhausted);
        match (opened_any, last_open_error) {
            (false, Some(e)) => Err(ProbeError::Unavailable(e)),
            _ => Err(ProbeError::Exhausted { cycles: 1 }),
        }
    }

    fn present<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        candidate: &LinkConfig,
    ) -> Result<Reply, LinkError> {
        let banner = test_banner(candidate);
        link.drain_input()?;
        link.write_bytes(&banner)?;
        if let ProbeState::Probing(i) = self.state {
            self.enter(ProbeState::AwaitingConfirmation(i));
        }
        await_confirmation(link, self.confirm_timeout, &banner)
    }
}

/// The banner shown on the terminal for one candidate.
pub fn test_banner(config: &LinkConfig) -> Vec<u8> {
    format!(
        "\r\nTEST {}\r\nSI TU LIS CECI\r\nTAPE y PUIS ENTREE\r\n> ",
        config.label()
    )
    .into_bytes()
}

/// Read the operator's answer. Lines that merely reflect `banner` are skipped.
fn await_confirmation<L: Link + ?Sized>(
    link: &mut L,
    timeout: Duration,
    banner: &[u8],
) -> Result<Reply, LinkError> {
    let deadline = Instant::now() + timeout;
    let mut line: Vec<u8> = Vec::new();

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Ok(Reply::Silence);
        }
        let wait = (deadline - now).min(POLL_INTERVAL);
        let Some(raw) = link.read_byte(wait)? else {
            continue;
        };
        // Parity is unknown during the probe; look at 7 bits only.
        let b = raw & 0x7f;
        tracing::trace!("Probe RX: {:#04x}", raw);

        match b {
            b'\r' | b'\n' => {
                if line.is_empty() {
                    continue;
                }
                if lines_of(banner).any(|sent| sent == line.as_slice()) {
                    tracing::debug!("Probe: ignoring reflected banner line");
                    line.clear();
                    continue;
                }
                return Ok(if is_affirmative(&line) { Reply::Yes } else { Reply::No });
            }
            0x08 | 0x7f => {
                line.pop();
            }
            _ => line.push(b),
        }
    }
}

/// A single affirmative key, possibly after a reflected prompt (`> y`).
fn is_affirmative(line: &[u8]) -> bool {
    let trimmed = line.trim_ascii();
    match trimmed {
        [] => false,
        [key] => AFFIRMATIVE_KEYS.contains(key),
        [.., before, key] => AFFIRMATIVE_KEYS.contains(key) && !before.is_ascii_alphanumeric(),
    }
}
