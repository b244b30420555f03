use thiserror::Error;

/// Failures reported by a [`Link`](crate::Link) implementation.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The physical link could not be opened.
    #[error("cannot open {port}: {reason}")]
    Unavailable { port: String, reason: String },

    /// An operation was attempted on a closed link.
    #[error("link is not open")]
    NotOpen,

    /// The other side went away (EOF on the simulated console, unplugged adapter).
    #[error("link closed by peer")]
    Closed,

    #[error("link i/o error: {0}")]
    Io(#[from] std::io::Error),
}
