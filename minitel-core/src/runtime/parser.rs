#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Clear,
    Quit,
    /// Forget the link and probe again.
    Reset,
    Model(Option<String>),
    Debug,
    HistoryReset,
    NoPage,
    Page(Option<usize>),
    Throttle(ThrottleArgs),
    Stream,
    Unknown(String),
    /// A known command with arguments it cannot use.
    Usage(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleArgs {
    Show,
    Line(u64),
    LineAndChar(u64, u64),
}

pub const THROTTLE_USAGE: &str = "Usage: /throttle <ms> [car_ms]";
pub const PAGE_USAGE: &str = "Usage: /page <lignes>";

pub struct CommandParser;

impl CommandParser {
    /// `None` when the input is a prompt for the backend rather than a command.
    pub fn parse(input: &str) -> Option<Command> {
        let trimmed = input.trim();
        let rest = trimmed.strip_prefix('/')?;

        let mut split = rest.splitn(2, char::is_whitespace);
        let name = split.next().unwrap_or_default().to_lowercase();
        let arg = split.next().map(str::trim).filter(|a| !a.is_empty());

        let command = match name.as_str() {
            "help" | "aide" => Command::Help,
            "clear" => Command::Clear,
            "quit" | "exit" => Command::Quit,
            "reset" => Command::Reset,
            "model" => Command::Model(arg.map(str::to_string)),
            "debug" => Command::Debug,
            "history_reset" => Command::HistoryReset,
            "nopage" => Command::NoPage,
            "stream" => Command::Stream,
            "page" => match arg.map(str::parse::<usize>) {
                None => Command::Page(None),
                Some(Ok(n)) if n > 0 => Command::Page(Some(n)),
                Some(_) => Command::Usage(PAGE_USAGE),
            },
            "throttle" => Self::parse_throttle(arg),
            _ => Command::Unknown(format!("/{}", name)),
        };
        Some(command)
    }

    fn parse_throttle(arg: Option<&str>) -> Command {
        let Some(arg) = arg else {
            return Command::Throttle(ThrottleArgs::Show);
        };
        let values: Vec<Option<u64>> = arg.split_whitespace().map(|v| v.parse().ok()).collect();
        match values.as_slice() {
            [Some(line)] => Command::Throttle(ThrottleArgs::Line(*line)),
            [Some(line), Some(ch)] => Command::Throttle(ThrottleArgs::LineAndChar(*line, *ch)),
            _ => Command::Usage(THROTTLE_USAGE),
        }
    }
}
