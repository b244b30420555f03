pub mod parser;

pub use parser::{Command, CommandParser, ThrottleArgs};
