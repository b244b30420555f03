//! minitel-gpt: entry point.
//!
//! ```text
//! minitel-gpt                     Probe (or reuse) the serial link and chat
//! minitel-gpt --port /dev/ttyUSB0 Use this port
//! minitel-gpt --simulate          Chat on this console, no hardware
//! ```

use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};
use clap::Parser;
use directories::ProjectDirs;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use minitel_bridge::cli::Cli;
use minitel_bridge::profile;
use minitel_bridge::startup::{self, DIAGNOSTIC};
use minitel_core::{
    Collaborators, Session, SessionOutcome, SessionSettings, SettingsStore, StoredSettings, Vault,
};
use minitel_io::{LinkProbe, SerialLink, SimulatedLink, available_ports};
use minitel_neural::OpenAiClient;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("minitel-gpt v{}", env!("CARGO_PKG_VERSION"));

    let dirs = ProjectDirs::from("fr", "minitel", "minitel-gpt");

    let vault_path = startup::vault_path(cli.vault.as_deref(), dirs.as_ref().map(|d| d.data_dir()));
    if let Some(parent) = vault_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let vault = Vault::open(&vault_path)
        .with_context(|| format!("cannot open vault {}", vault_path.display()))?;
    let stats = vault.stats()?;
    info!(
        "Vault: {} ({} turn(s) of history, {} session(s))",
        vault_path.display(),
        stats.turns,
        stats.total_sessions
    );

    let profile_path =
        profile::profile_path(cli.profile.as_deref(), dirs.as_ref().map(|d| d.config_dir()));
    let system_prompt = profile::load_profile(&profile_path);

    // The HTTP client runs here; the session itself stays on the main thread.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start the async runtime")?;
    let api_key = cli.api_key.clone().unwrap_or_default();
    let client = OpenAiClient::new(&cli.base_url, &api_key, runtime.handle().clone())?;

    let mut bridge = Bridge {
        cli,
        vault,
        client,
        system_prompt,
    };
    let result = bridge.run();

    if let Err(e) = bridge.vault.close_session() {
        warn!("Vault: cannot close session: {}", e);
    }
    info!("Bye");
    result
}

struct Bridge {
    cli: Cli,
    vault: Vault,
    client: OpenAiClient,
    system_prompt: String,
}

impl Bridge {
    fn run(&mut self) -> Result<()> {
        loop {
            let outcome = if self.cli.simulate {
                self.serve_simulated()?
            } else {
                self.serve_serial()?
            };

            match outcome {
                SessionOutcome::Quit => return Ok(()),
                SessionOutcome::Reconfigure => info!("Reconfiguring the link"),
                // Console input is gone; nobody is left to ask.
                SessionOutcome::LinkLost if self.cli.simulate => return Ok(()),
                SessionOutcome::LinkLost => {
                    print_diagnostic(&"liaison perdue");
                    if !ask_retry()? {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn stored(&self) -> StoredSettings {
        let mut stored = self.vault.load_settings().unwrap_or_else(|e| {
            warn!("Saved settings unreadable, using defaults: {:#}", e);
            StoredSettings {
                link: None,
                settings: SessionSettings::default(),
            }
        });
        self.cli.apply(&mut stored.settings);
        stored
    }

    fn collaborators(&self, settings: Box<dyn SettingsStore>) -> Collaborators {
        Collaborators {
            backend: Box::new(self.client.clone()),
            history: Box::new(self.vault.clone()),
            settings,
            system_prompt: Some(self.system_prompt.clone()),
        }
    }

    fn serve_simulated(&mut self) -> Result<SessionOutcome> {
        let settings = startup::simulated_settings(self.stored().settings);
        // Console tweaks must not overwrite the serial settings.
        let scratch = Vault::in_memory()?;
        let mut session = Session::new(
            SimulatedLink::new(),
            settings,
            self.collaborators(Box::new(scratch)),
        );
        Ok(session.run()?)
    }

    fn serve_serial(&mut self) -> Result<SessionOutcome> {
        let stored = self.stored();
        let mut settings = stored.settings;

        let ports = available_ports().unwrap_or_else(|e| {
            warn!("Cannot list serial ports: {:#}", e);
            Vec::new()
        });
        for port in &ports {
            info!("Serial port found: {}", port);
        }
        let Some(port) =
            startup::choose_port(self.cli.port.as_deref(), settings.port.as_deref(), &ports)
        else {
            bail!("no serial port found; plug in the adapter or pass --port");
        };

        // Saved line settings only hold for the port they were confirmed on.
        let saved = stored
            .link
            .filter(|_| settings.port.as_deref() == Some(port.as_str()));
        settings.port = Some(port.clone());
        let mut link = SerialLink::new(port);

        loop {
            let mut probe = LinkProbe::default();
            match startup::resolve_link(
                &mut link,
                saved,
                &mut probe,
                self.cli.probe_cycles,
                &mut settings,
                &mut self.vault,
            ) {
                Ok(_) => break,
                Err(e) => {
                    print_diagnostic(&e);
                    if !ask_retry()? {
                        return Ok(SessionOutcome::Quit);
                    }
                }
            }
        }

        let collaborators = self.collaborators(Box::new(self.vault.clone()));
        let mut session = Session::new(link, settings, collaborators);
        match session.run() {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_link_lost() => {
                warn!("{}", e);
                Ok(SessionOutcome::LinkLost)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn print_diagnostic(cause: &dyn std::fmt::Display) {
    eprintln!();
    eprintln!("Erreur: {}", cause);
    for line in DIAGNOSTIC {
        eprintln!("{}", line);
    }
}

/// Ask on the console whether to try again. End of input means no.
fn ask_retry() -> Result<bool> {
    eprint!("Reessayer ? [O/n] ");
    std::io::stderr().flush()?;
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer)? == 0 {
        return Ok(false);
    }
    Ok(!matches!(answer.trim(), "n" | "N" | "non" | "no"))
}
