//! Session Loop: prompt, read a line, answer it, repeat.
//!
//! One session owns the link for its whole life. Everything written goes
//! through the throttled writer and is recorded in the echo window; every
//! response goes through the stream wrapper and the pager.

use crate::echo::EchoFilter;
use crate::error::SessionError;
use crate::input::{DEFAULT_IDLE_TIMEOUT, InputReader, LineRead};
use crate::pager::{Pager, PaginationSwitch, Screen};
use crate::runtime::parser::CommandParser;
use crate::settings::SessionSettings;
use crate::text::{DEFAULT_WIDTH, StreamWrapper, decode_latin1, encode_line, encode_raw};
use crate::throttle::{Pacer, ThreadPacer, ThrottledWriter};
use crate::vault::{HistoryStore, SettingsStore};
use minitel_io::Link;
use minitel_neural::{ApiError, ChatBackend, ChatRequest, Turn};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const PROMPT: &str = "> ";
pub const FORM_FEED: u8 = 0x0c;
pub const API_ERROR_NOTICE: &str = "Erreur API. Reessaie.";
pub const TRANSMISSION_NOTICE: &str = "Erreur d'affichage.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Quit,
    /// Forget the link and probe again.
    Reconfigure,
    LinkLost,
}

/// Injected collaborators.
pub struct Collaborators {
    pub backend: Box<dyn ChatBackend>,
    pub history: Box<dyn HistoryStore>,
    pub settings: Box<dyn SettingsStore>,
    pub system_prompt: Option<String>,
}

/// The output side: link, pacing, and echo bookkeeping.
pub(crate) struct Terminal<L: Link, P: Pacer> {
    pub(crate) link: L,
    pub(crate) writer: ThrottledWriter<P>,
    pub(crate) echo: EchoFilter,
    pub(crate) input: InputReader,
}

impl<L: Link, P: Pacer> Screen for Terminal<L, P> {
    fn send_line(&mut self, line: &str) -> Result<(), SessionError> {
        let bytes = encode_line(line);
        self.writer.write_encoded_line(&mut self.link, &bytes)?;
        self.echo.record_sent(&bytes);
        Ok(())
    }

    fn send_raw(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.writer.write_raw(&mut self.link, bytes)?;
        self.echo.record_sent(bytes);
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), SessionError> {
        Ok(self.link.drain_input()?)
    }

    fn wait_key(&mut self, timeout: Duration) -> Result<Option<u8>, SessionError> {
        Ok(self.input.read_key(&mut self.link, timeout)?)
    }
}

enum RenderFailure {
    Backend(anyhow::Error),
    Output(SessionError),
}

pub struct Session<L: Link, P: Pacer = ThreadPacer> {
    pub(crate) term: Terminal<L, P>,
    pub(crate) pager: Pager,
    pub(crate) settings: SessionSettings,
    pub(crate) backend: Box<dyn ChatBackend>,
    pub(crate) history: Box<dyn HistoryStore>,
    pub(crate) store: Box<dyn SettingsStore>,
    system_prompt: Option<String>,
    idle_timeout: Duration,
    exchanges: usize,
}

impl<L: Link> Session<L, ThreadPacer> {
    pub fn new(link: L, settings: SessionSettings, collaborators: Collaborators) -> Self {
        Self::with_pacer(link, settings, collaborators, ThreadPacer)
    }
}

impl<L: Link, P: Pacer> Session<L, P> {
    pub fn with_pacer(
        link: L,
        settings: SessionSettings,
        collaborators: Collaborators,
        pacer: P,
    ) -> Self {
        let mut input = InputReader::new(settings.link.rx_mask());
        input.set_trace(settings.debug);

        Self {
            term: Terminal {
                link,
                writer: ThrottledWriter::with_pacer(settings.throttle, pacer),
                echo: EchoFilter::new(settings.echo),
                input,
            },
            pager: Pager::new(settings.pager),
            backend: collaborators.backend,
            history: collaborators.history,
            store: collaborators.settings,
            system_prompt: collaborators.system_prompt,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            exchanges: 0,
            settings,
        }
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn link(&self) -> &L {
        &self.term.link
    }

    pub fn into_link(self) -> L {
        self.term.link
    }

    pub fn writer(&self) -> &ThrottledWriter<P> {
        &self.term.writer
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    pub fn echo(&self) -> &EchoFilter {
        &self.term.echo
    }

    /// Flip pagination from outside the loop (takes effect at the next pause point).
    pub fn pagination_switch(&self) -> PaginationSwitch {
        self.pager.switch()
    }

    /// Completed prompt/response exchanges.
    pub fn exchanges(&self) -> usize {
        self.exchanges
    }

    /// Run until the operator quits, asks for a reconfiguration, or the link dies.
    pub fn run(&mut self) -> Result<SessionOutcome, SessionError> {
        if !self.term.link.is_open() {
            self.term.link.open(&self.settings.link)?;
        }
        info!(
            "Session started on {} at {}",
            self.term.link.name(),
            self.settings.link.label()
        );
        self.term.echo.reset();
        self.term.input.reset();

        let outcome = match self.serve() {
            Ok(outcome) => outcome,
            Err(e @ (SessionError::LinkUnavailable(_) | SessionError::Transmission(_))) => {
                warn!("Link lost: {}", e);
                SessionOutcome::LinkLost
            }
            Err(e) => return Err(e),
        };

        self.term.link.close();
        info!("Session ended: {:?}", outcome);
        Ok(outcome)
    }

    fn serve(&mut self) -> Result<SessionOutcome, SessionError> {
        self.banner()?;
        let mut prompt = true;

        loop {
            if prompt {
                self.term.send_raw(&encode_raw(PROMPT))?;
            }
            prompt = true;

            let raw = match self.term.input.read_line(
                &mut self.term.link,
                self.idle_timeout,
                self.settings.local_echo,
            )? {
                LineRead::Line(raw) => raw,
                LineRead::Idle => {
                    if !self.term.link.is_open() {
                        return Ok(SessionOutcome::LinkLost);
                    }
                    prompt = false;
                    continue;
                }
            };

            if self.settings.local_echo {
                self.term.send_line("")?;
            }

            let filtered = self.term.echo.filter(&raw);
            if filtered.is_empty() && !raw.is_empty() {
                debug!("Ignoring reflected line ({} bytes)", raw.len());
                prompt = false;
                continue;
            }

            let text = decode_latin1(&filtered);
            let text = text.trim();
            if text.is_empty() {
                // Only our own CR LF is known to have moved the cursor.
                prompt = self.settings.local_echo;
                continue;
            }
            self.term.echo.reset();

            if let Some(command) = CommandParser::parse(text) {
                debug!("Command: {:?}", command);
                match self.run_command(command)? {
                    CommandOutcome::Continue => continue,
                    CommandOutcome::Quit => return Ok(SessionOutcome::Quit),
                    CommandOutcome::Reconfigure => return Ok(SessionOutcome::Reconfigure),
                }
            }

            self.exchange(text)?;
        }
    }

    fn banner(&mut self) -> Result<(), SessionError> {
        let rule = "=".repeat(DEFAULT_WIDTH);
        self.term.send_raw(&[FORM_FEED])?;
        for line in [
            rule.as_str(),
            "  MINITEL-GPT",
            "  Tape /help pour les commandes",
            rule.as_str(),
            "",
        ] {
            self.term.send_line(line)?;
        }
        Ok(())
    }

    /// Short notice, wrapped but not paged.
    pub(crate) fn say(&mut self, text: &str) -> Result<(), SessionError> {
        let mut wrapper = StreamWrapper::new(DEFAULT_WIDTH);
        let mut lines = wrapper.push(text);
        lines.extend(wrapper.finish());
        for line in lines {
            self.term.send_line(&line)?;
        }
        Ok(())
    }

    /// Longer text, wrapped and paged.
    pub(crate) fn show(&mut self, text: &str) -> Result<(), SessionError> {
        self.pager.begin_response();
        let mut wrapper = StreamWrapper::new(DEFAULT_WIDTH);
        let mut lines = wrapper.push(text);
        lines.extend(wrapper.finish());
        for line in lines {
            self.pager.emit(&mut self.term, &line)?;
        }
        Ok(())
    }

    /// Persist the current settings; failures are logged, never fatal.
    pub(crate) fn persist(&mut self) {
        self.settings.pager = self.pager.settings();
        self.settings.throttle = self.term.writer.policy();
        if let Err(e) = self.store.save_settings(&self.settings) {
            warn!("{}", SessionError::collaborator("settings store", e));
        }
    }

    fn exchange(&mut self, prompt: &str) -> Result<(), SessionError> {
        self.term.send_line("")?;

        let history = self.history.turns().unwrap_or_else(|e| {
            warn!("{}", SessionError::collaborator("history store", e));
            Vec::new()
        });
        let request = ChatRequest {
            model: self.settings.model.clone(),
            system: self.system_prompt.clone(),
            history,
            prompt: prompt.to_string(),
            stream: self.settings.stream,
        };

        self.pager.begin_response();
        self.term.writer.reset_progress();
        let mut reply = String::new();

        match self.render(&request, &mut reply) {
            Ok(()) => {
                self.exchanges += 1;
                let turns = [Turn::user(prompt), Turn::assistant(reply)];
                if let Err(e) = self.history.append(&turns) {
                    warn!("{}", SessionError::collaborator("history store", e));
                }
            }
            Err(RenderFailure::Backend(e)) => {
                let kind = e
                    .downcast_ref::<ApiError>()
                    .map(ApiError::kind)
                    .unwrap_or("Erreur");
                warn!("{}", SessionError::collaborator("chat backend", &e));
                self.term.send_line("")?;
                self.term.send_line(API_ERROR_NOTICE)?;
                self.term.send_line(&format!("[{}]", kind))?;
            }
            Err(RenderFailure::Output(e @ SessionError::Transmission(_))) => {
                warn!("Response abandoned: {}", e);
                // If this fails too the link is gone.
                self.term.send_line("")?;
                self.term.send_line(TRANSMISSION_NOTICE)?;
            }
            Err(RenderFailure::Output(e)) => return Err(e),
        }

        self.term.send_line("")?;
        Ok(())
    }

    /// Stream the backend's fragments through wrapper and pager.
    fn render(&mut self, request: &ChatRequest, reply: &mut String) -> Result<(), RenderFailure> {
        let fragments = self.backend.complete(request).map_err(RenderFailure::Backend)?;
        let mut wrapper = StreamWrapper::new(DEFAULT_WIDTH);

        for fragment in fragments {
            let fragment = fragment.map_err(RenderFailure::Backend)?;
            reply.push_str(&fragment);
            for line in wrapper.push(&fragment) {
                self.pager
                    .emit(&mut self.term, &line)
                    .map_err(RenderFailure::Output)?;
            }
        }
        for line in wrapper.finish() {
            self.pager
                .emit(&mut self.term, &line)
                .map_err(RenderFailure::Output)?;
        }
        Ok(())
    }

    pub(crate) fn set_debug(&mut self, on: bool) {
        self.settings.debug = on;
        self.term.input.set_trace(on);
    }

    pub(crate) fn send_form_feed(&mut self) -> Result<(), SessionError> {
        self.term.send_raw(&[FORM_FEED])
    }
}

pub(crate) enum CommandOutcome {
    Continue,
    Quit,
    Reconfigure,
}
