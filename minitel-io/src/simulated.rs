//! A stand-in terminal on stdin/stdout, for working without hardware.
//!
//! Output bytes are Latin-1 and are shown as such on the console. Console
//! input arrives as UTF-8 lines and is re-encoded to what a terminal would
//! have sent: Latin-1 bytes followed by CR.

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::link::Link;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError, unbounded};
use std::io::{BufRead, Write};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct SimulatedLink {
    rx: Option<Receiver<u8>>,
    open: bool,
}

impl SimulatedLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn_reader() -> Receiver<u8> {
        let (tx, rx) = unbounded();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let mut bytes: Vec<u8> = line.chars().map(latin1_or_placeholder).collect();
                bytes.push(b'\r');
                for b in bytes {
                    if tx.send(b).is_err() {
                        return;
                    }
                }
            }
            tracing::debug!("Simulated console reached EOF");
        });
        rx
    }
}

fn latin1_or_placeholder(c: char) -> u8 {
    u8::try_from(u32::from(c)).unwrap_or(b'?')
}

impl Link for SimulatedLink {
    fn name(&self) -> &str {
        "SIMULATE"
    }

    fn open(&mut self, config: &LinkConfig) -> Result<(), LinkError> {
        if self.rx.is_none() {
            self.rx = Some(Self::spawn_reader());
        }
        self.open = true;
        tracing::info!("Simulated link open ({})", config.label());
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, LinkError> {
        if !self.open {
            return Err(LinkError::NotOpen);
        }
        let rx = self.rx.as_ref().ok_or(LinkError::NotOpen)?;
        if timeout.is_zero() {
            return match rx.try_recv() {
                Ok(b) => Ok(Some(b)),
                Err(TryRecvError::Empty) => Ok(None),
                Err(TryRecvError::Disconnected) => Err(LinkError::Closed),
            };
        }
        match rx.recv_timeout(timeout) {
            Ok(b) => Ok(Some(b)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Closed),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if !self.open {
            return Err(LinkError::NotOpen);
        }
        let mut text = String::with_capacity(bytes.len());
        for &b in bytes {
            match b {
                b'\r' => {}
                0x0c => text.push_str("\n\n\n\n\n"),
                _ => text.push(char::from(b)),
            }
        }
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
