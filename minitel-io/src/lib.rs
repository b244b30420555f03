//! # Minitel IO
//!
//! The Hardware Bridge.
//! Everything that touches the physical (or simulated) serial link lives here:
//! the link capability trait, its variants, and the probe that discovers a
//! working configuration against an uncooperative terminal.

pub mod config;
pub mod error;
pub mod link;
pub mod probe;
pub mod scripted;
pub mod serial;
pub mod simulated;

pub use config::{BaudRate, DataBits, LinkConfig, Parity, StopBits};
pub use error::LinkError;
pub use link::{Link, is_line_break, lines_of};
pub use probe::{LinkProbe, ProbeError, ProbeOutcome, ProbeState};
pub use scripted::ScriptedLink;
pub use serial::{SerialLink, available_ports};
pub use simulated::SimulatedLink;
