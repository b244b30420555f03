use clap::Parser;
use minitel_core::SessionSettings;
use minitel_neural::DEFAULT_BASE_URL;
use std::path::PathBuf;

use crate::startup::DEFAULT_PROBE_CYCLES;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug, Clone)]
#[command(
    name = "minitel-gpt",
    version,
    about = "Chat with a language model from a Minitel terminal"
)]
pub struct Cli {
    /// Use this console instead of a serial port.
    #[arg(long)]
    pub simulate: bool,

    /// Serial port, e.g. /dev/ttyUSB0, /dev/cu.usbserial-1420 or COM3.
    #[arg(short, long)]
    pub port: Option<String>,

    /// Verbose logs and a trace of every received byte.
    #[arg(long)]
    pub debug: bool,

    /// Ask for whole answers instead of streamed ones.
    #[arg(long)]
    pub no_stream: bool,

    /// SQLite file holding history and settings.
    #[arg(long, value_name = "FILE")]
    pub vault: Option<PathBuf>,

    /// Text file with the system prompt.
    #[arg(long, value_name = "FILE")]
    pub profile: Option<PathBuf>,

    /// Model to use (overrides the saved one).
    #[arg(short, long)]
    pub model: Option<String>,

    /// OpenAI-compatible API root.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Full passes over the candidate list before giving up.
    #[arg(long, default_value_t = DEFAULT_PROBE_CYCLES)]
    pub probe_cycles: usize,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }

    /// Command-line choices win over saved settings.
    pub fn apply(&self, settings: &mut SessionSettings) {
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        if self.no_stream {
            settings.stream = false;
        }
        settings.debug = self.debug;
    }
}
