//! Session-scoped settings and their persisted key/value form.

use crate::echo::EchoSettings;
use crate::pager::PagerSettings;
use crate::throttle::ThrottlePolicy;
use minitel_io::{BaudRate, DataBits, LinkConfig, Parity, StopBits};
use minitel_neural::DEFAULT_MODEL;
use std::collections::HashMap;

pub mod keys {
    pub const BAUD: &str = "baud";
    pub const DATA_BITS: &str = "data_bits";
    pub const PARITY: &str = "parity";
    pub const STOP_BITS: &str = "stop_bits";
    pub const PORT: &str = "port";
    pub const INTER_CHAR_DELAY_MS: &str = "inter_char_delay_ms";
    pub const INTER_LINE_DELAY_MS: &str = "inter_line_delay_ms";
    pub const PAGE_SIZE: &str = "page_size";
    pub const PAGINATION_ENABLED: &str = "pagination_enabled";
    pub const MODEL: &str = "model";
    pub const LOCAL_ECHO: &str = "local_echo";
    pub const ECHO_FILTER: &str = "echo_filter";
    pub const ECHO_LOOKBACK: &str = "echo_lookback";
    pub const ECHO_MIN_MATCH: &str = "echo_min_match";
    pub const STREAM: &str = "stream";

    pub const LINK: [&str; 4] = [BAUD, DATA_BITS, PARITY, STOP_BITS];
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub link: LinkConfig,
    pub port: Option<String>,
    pub throttle: ThrottlePolicy,
    pub pager: PagerSettings,
    pub echo: EchoSettings,
    pub model: String,
    /// Write typed characters back to the terminal.
    pub local_echo: bool,
    pub stream: bool,
    /// Trace every inbound byte. Not persisted.
    pub debug: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            port: None,
            throttle: ThrottlePolicy::default(),
            pager: PagerSettings::default(),
            echo: EchoSettings::default(),
            model: DEFAULT_MODEL.to_string(),
            local_echo: true,
            stream: true,
            debug: false,
        }
    }
}

/// Settings as loaded: the link is `None` when it was never confirmed or
/// the stored fields do not describe a valid configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSettings {
    pub link: Option<LinkConfig>,
    pub settings: SessionSettings,
}

impl SessionSettings {
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (keys::BAUD, self.link.baud.as_u32().to_string()),
            (keys::DATA_BITS, self.link.data_bits.as_u8().to_string()),
            (keys::PARITY, self.link.parity.as_char().to_string()),
            (keys::STOP_BITS, self.link.stop_bits.as_u8().to_string()),
            (keys::INTER_CHAR_DELAY_MS, self.throttle.inter_char_delay_ms.to_string()),
            (keys::INTER_LINE_DELAY_MS, self.throttle.inter_line_delay_ms.to_string()),
            (keys::PAGE_SIZE, self.pager.page_size.to_string()),
            (keys::PAGINATION_ENABLED, self.pager.enabled.to_string()),
            (keys::MODEL, self.model.clone()),
            (keys::LOCAL_ECHO, self.local_echo.to_string()),
            (keys::ECHO_FILTER, self.echo.enabled.to_string()),
            (keys::ECHO_LOOKBACK, self.echo.lookback.to_string()),
            (keys::ECHO_MIN_MATCH, self.echo.min_match.to_string()),
            (keys::STREAM, self.stream.to_string()),
        ];
        if let Some(port) = &self.port {
            pairs.push((keys::PORT, port.clone()));
        }
        pairs
    }

    /// Rebuild from stored rows. Unknown or unparsable values fall back to defaults.
    pub fn from_pairs(pairs: &HashMap<String, String>) -> StoredSettings {
        let get = |key: &str| pairs.get(key).map(|v| v.trim());
        fn parsed<T: std::str::FromStr>(v: Option<&str>) -> Option<T> {
            v.and_then(|v| v.parse().ok())
        }

        let defaults = SessionSettings::default();
        let link = parse_link(&get);

        let settings = SessionSettings {
            link: link.unwrap_or(defaults.link),
            port: get(keys::PORT).filter(|p| !p.is_empty()).map(str::to_string),
            throttle: ThrottlePolicy {
                inter_char_delay_ms: parsed(get(keys::INTER_CHAR_DELAY_MS))
                    .unwrap_or(defaults.throttle.inter_char_delay_ms),
                inter_line_delay_ms: parsed(get(keys::INTER_LINE_DELAY_MS))
                    .unwrap_or(defaults.throttle.inter_line_delay_ms),
            },
            pager: PagerSettings {
                page_size: parsed(get(keys::PAGE_SIZE))
                    .filter(|&n: &usize| n > 0)
                    .unwrap_or(defaults.pager.page_size),
                enabled: parsed(get(keys::PAGINATION_ENABLED)).unwrap_or(defaults.pager.enabled),
                pause_timeout: defaults.pager.pause_timeout,
            },
            echo: EchoSettings {
                enabled: parsed(get(keys::ECHO_FILTER)).unwrap_or(defaults.echo.enabled),
                lookback: parsed(get(keys::ECHO_LOOKBACK))
                    .filter(|&n: &usize| n > 0)
                    .unwrap_or(defaults.echo.lookback),
                min_match: parsed(get(keys::ECHO_MIN_MATCH))
                    .filter(|&n: &usize| n > 0)
                    .unwrap_or(defaults.echo.min_match),
            },
            model: get(keys::MODEL)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .unwrap_or(defaults.model),
            local_echo: parsed(get(keys::LOCAL_ECHO)).unwrap_or(defaults.local_echo),
            stream: parsed(get(keys::STREAM)).unwrap_or(defaults.stream),
            debug: false,
        };

        StoredSettings { link, settings }
    }
}

fn parse_link<'a>(get: &impl Fn(&str) -> Option<&'a str>) -> Option<LinkConfig> {
    let baud = BaudRate::from_u32(get(keys::BAUD)?.parse().ok()?)?;
    let data_bits = DataBits::from_u8(get(keys::DATA_BITS)?.parse().ok()?)?;
    let parity = Parity::from_char(get(keys::PARITY)?.chars().next()?)?;
    let stop_bits = StopBits::from_u8(get(keys::STOP_BITS)?.parse().ok()?)?;
    let config = LinkConfig {
        stop_bits,
        ..LinkConfig::new(baud, data_bits, parity)
    };
    Some(config.confirm())
}
