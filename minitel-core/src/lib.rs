pub mod builtins;
pub mod echo;
pub mod error;
pub mod input;
pub mod pager;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod text;
pub mod throttle;
pub mod vault;

// Re-export the main types so callers can just use `minitel_core::Session`
pub use echo::{EchoFilter, EchoSettings};
pub use error::SessionError;
pub use input::{InputReader, LineRead};
pub use pager::{Pager, PagerSettings, PaginationSwitch, Screen};
pub use session::{Collaborators, Session, SessionOutcome};
pub use settings::{SessionSettings, StoredSettings};
pub use text::{StreamWrapper, decode_latin1, encode_line, to_latin1, wrap};
pub use throttle::{Pacer, ThreadPacer, ThrottlePolicy, ThrottledWriter, TransmissionFailure};
pub use vault::{HistoryStore, SettingsStore, Vault};
