//! Pager: a "more" prompt every N lines so a 24-row screen is never overrun.

use crate::error::SessionError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_PAGE_SIZE: usize = 18;
pub const DEFAULT_PAUSE_TIMEOUT: Duration = Duration::from_secs(300);
pub const MARKER: &str = "-- suite (touche) --";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagerSettings {
    pub page_size: usize,
    pub enabled: bool,
    pub pause_timeout: Duration,
}

impl Default for PagerSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            enabled: true,
            pause_timeout: DEFAULT_PAUSE_TIMEOUT,
        }
    }
}

/// Pagination on/off, shared so it can be flipped while a response is in flight.
#[derive(Debug, Clone)]
pub struct PaginationSwitch(Arc<AtomicBool>);

impl PaginationSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }

    /// Flip and return the new state.
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::SeqCst)
    }
}

/// What the pager needs from the output side.
pub trait Screen {
    fn send_line(&mut self, line: &str) -> Result<(), SessionError>;
    fn send_raw(&mut self, bytes: &[u8]) -> Result<(), SessionError>;
    fn discard_input(&mut self) -> Result<(), SessionError>;
    fn wait_key(&mut self, timeout: Duration) -> Result<Option<u8>, SessionError>;
}

#[derive(Debug)]
pub struct Pager {
    page_size: usize,
    pause_timeout: Duration,
    switch: PaginationSwitch,
    since_pause: usize,
    pauses: usize,
}

impl Pager {
    pub fn new(settings: PagerSettings) -> Self {
        Self::with_switch(settings, PaginationSwitch::new(settings.enabled))
    }

    pub fn with_switch(settings: PagerSettings, switch: PaginationSwitch) -> Self {
        Self {
            page_size: settings.page_size.max(1),
            pause_timeout: settings.pause_timeout,
            switch,
            since_pause: 0,
            pauses: 0,
        }
    }

    pub fn switch(&self) -> PaginationSwitch {
        self.switch.clone()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
    }

    pub fn settings(&self) -> PagerSettings {
        PagerSettings {
            page_size: self.page_size,
            enabled: self.switch.is_enabled(),
            pause_timeout: self.pause_timeout,
        }
    }

    /// Pauses taken since creation.
    pub fn pauses(&self) -> usize {
        self.pauses
    }

    pub fn begin_response(&mut self) {
        self.since_pause = 0;
    }

    /// Send one content line, pausing once a full page has gone out.
    pub fn emit<S: Screen + ?Sized>(&mut self, screen: &mut S, line: &str) -> Result<(), SessionError> {
        screen.send_line(line)?;
        self.since_pause += 1;
        if self.since_pause >= self.page_size {
            self.since_pause = 0;
            if self.switch.is_enabled() {
                self.pause(screen)?;
            }
        }
        Ok(())
    }

    fn pause<S: Screen + ?Sized>(&mut self, screen: &mut S) -> Result<(), SessionError> {
        self.pauses += 1;
        // Typeahead must not skip the page.
        screen.discard_input()?;
        screen.send_line("")?;
        screen.send_raw(MARKER.as_bytes())?;

        match screen.wait_key(self.pause_timeout)? {
            Some(key) => debug!("Pager: resumed by 0x{:02x}", key),
            None => info!("Pager: no key after {:?}, resuming", self.pause_timeout),
        }

        let mut erase = Vec::with_capacity(MARKER.len() + 2);
        erase.push(b'\r');
        erase.resize(MARKER.len() + 1, b' ');
        erase.push(b'\r');
        screen.send_raw(&erase)
    }
}
