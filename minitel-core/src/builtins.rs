//! Built-in `/` command handlers.
//!
//! Every reply is plain ASCII so it renders the same on any terminal
//! character set.

use crate::error::SessionError;
use crate::runtime::parser::{Command, ThrottleArgs};
use crate::session::{CommandOutcome, Session};
use crate::throttle::Pacer;
use minitel_io::Link;
use tracing::{info, warn};

pub const HELP_TEXT: &str = "COMMANDES DISPONIBLES:
/help    - Cette aide
/clear   - Effacer ecran
/quit    - Quitter
/reset   - Reconfigurer serie
/model   - Voir/changer modele
/model X - Changer pour X
/debug   - Toggle debug RX
/history_reset - Effacer historique
/nopage  - Toggle pagination
/page N  - Lignes par page
/throttle N [C] - Delai ligne [car] (ms)
/stream  - Toggle streaming";

fn on_off(on: bool, what: &str) -> String {
    if on {
        format!("{} actif", what)
    } else {
        format!("{} desactive", what)
    }
}

impl<L: Link, P: Pacer> Session<L, P> {
    /// Central dispatch for all `/` commands.
    pub(crate) fn run_command(&mut self, command: Command) -> Result<CommandOutcome, SessionError> {
        match command {
            // ── Screen ──
            Command::Help => self.show(HELP_TEXT)?,
            Command::Clear => self.send_form_feed()?,

            // ── Lifecycle ──
            Command::Quit => {
                self.say("Au revoir!")?;
                return Ok(CommandOutcome::Quit);
            }
            Command::Reset => {
                self.say("Relance config serie...")?;
                if let Err(e) = self.store.clear_link() {
                    warn!("{}", SessionError::collaborator("settings store", e));
                }
                return Ok(CommandOutcome::Reconfigure);
            }

            // ── Backend ──
            Command::Model(None) => {
                let reply = format!("Modele actuel: {}", self.settings.model);
                self.say(&reply)?;
            }
            Command::Model(Some(name)) => {
                info!("Model changed: {} -> {}", self.settings.model, name);
                self.settings.model = name;
                self.persist();
                let reply = format!("Modele: {}", self.settings.model);
                self.say(&reply)?;
            }
            Command::Stream => {
                self.settings.stream = !self.settings.stream;
                self.persist();
                self.say(&on_off(self.settings.stream, "Streaming"))?;
            }
            Command::HistoryReset => match self.history.reset() {
                Ok(()) => self.say("Historique efface")?,
                Err(e) => {
                    warn!("{}", SessionError::collaborator("history store", e));
                    self.say("Historique non efface")?;
                }
            },

            // ── Diagnostics ──
            Command::Debug => {
                let on = !self.settings.debug;
                self.set_debug(on);
                info!("RX trace {}", if on { "enabled" } else { "disabled" });
                self.say(&on_off(on, "Debug RX"))?;
            }

            // ── Display pacing ──
            Command::NoPage => {
                let on = self.pager.switch().toggle();
                self.persist();
                let reply = if on {
                    "Pagination activee"
                } else {
                    "Pagination desactivee"
                };
                self.say(reply)?;
            }
            Command::Page(None) => {
                let reply = format!("Page: {} lignes", self.pager.page_size());
                self.say(&reply)?;
            }
            Command::Page(Some(n)) => {
                self.pager.set_page_size(n);
                self.persist();
                let reply = format!("Page: {} lignes", self.pager.page_size());
                self.say(&reply)?;
            }
            Command::Throttle(args) => {
                let mut policy = self.term.writer.policy();
                match args {
                    ThrottleArgs::Show => {}
                    ThrottleArgs::Line(line) => policy.inter_line_delay_ms = line,
                    ThrottleArgs::LineAndChar(line, ch) => {
                        policy.inter_line_delay_ms = line;
                        policy.inter_char_delay_ms = ch;
                    }
                }
                if args != ThrottleArgs::Show {
                    self.term.writer.set_policy(policy);
                    self.persist();
                }
                let reply = format!(
                    "Delai: {}ms, car: {}ms",
                    policy.inter_line_delay_ms, policy.inter_char_delay_ms
                );
                self.say(&reply)?;
            }

            // ── Fallthrough ──
            Command::Usage(usage) => self.say(usage)?,
            Command::Unknown(name) => {
                let reply = format!("Commande inconnue: {}", name);
                self.say(&reply)?;
            }
        }
        Ok(CommandOutcome::Continue)
    }
}
