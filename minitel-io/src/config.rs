//! Serial line configuration.
//!
//! A [`LinkConfig`] is a value: once confirmed it is never edited, a new
//! configuration replaces it wholesale.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Line speeds a Minitel-class terminal can be switched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BaudRate {
    B300,
    B1200,
    B4800,
    B9600,
}

impl BaudRate {
    pub const ALL: [BaudRate; 4] = [
        BaudRate::B300,
        BaudRate::B1200,
        BaudRate::B4800,
        BaudRate::B9600,
    ];

    pub fn as_u32(self) -> u32 {
        match self {
            BaudRate::B300 => 300,
            BaudRate::B1200 => 1200,
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
        }
    }

    pub fn from_u32(rate: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.as_u32() == rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataBits {
    Seven,
    Eight,
}

impl DataBits {
    pub fn as_u8(self) -> u8 {
        match self {
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }

    pub fn from_u8(bits: u8) -> Option<Self> {
        match bits {
            7 => Some(DataBits::Seven),
            8 => Some(DataBits::Eight),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parity {
    None,
    Even,
}

impl Parity {
    pub fn as_char(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Even => 'E',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'N' => Some(Parity::None),
            'E' => Some(Parity::Even),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopBits {
    One,
}

impl StopBits {
    pub fn as_u8(self) -> u8 {
        1
    }

    pub fn from_u8(bits: u8) -> Option<Self> {
        (bits == 1).then_some(StopBits::One)
    }
}

/// Configuration for a serial connection to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkConfig {
    pub baud: BaudRate,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub confirmed: bool,
}

impl LinkConfig {
    pub const fn new(baud: BaudRate, data_bits: DataBits, parity: Parity) -> Self {
        Self {
            baud,
            data_bits,
            parity,
            stop_bits: StopBits::One,
            confirmed: false,
        }
    }

    /// 7 data bits, even parity, 1 stop bit.
    pub const fn seven_e_one(baud: BaudRate) -> Self {
        Self::new(baud, DataBits::Seven, Parity::Even)
    }

    /// 8 data bits, no parity, 1 stop bit.
    pub const fn eight_n_one(baud: BaudRate) -> Self {
        Self::new(baud, DataBits::Eight, Parity::None)
    }

    /// The fixed probe order: rates ascending, then formats 7E1, 8N1, 7N1.
    pub fn candidates() -> Vec<LinkConfig> {
        const RATES: [BaudRate; 3] = [BaudRate::B1200, BaudRate::B4800, BaudRate::B9600];
        const FORMATS: [(DataBits, Parity); 3] = [
            (DataBits::Seven, Parity::Even),
            (DataBits::Eight, Parity::None),
            (DataBits::Seven, Parity::None),
        ];

        RATES
            .iter()
            .flat_map(|&baud| {
                FORMATS
                    .iter()
                    .map(move |&(bits, parity)| LinkConfig::new(baud, bits, parity))
            })
            .collect()
    }

    /// A confirmed copy of this configuration.
    pub fn confirm(self) -> Self {
        Self {
            confirmed: true,
            ..self
        }
    }

    /// Same line settings, ignoring the confirmation flag.
    pub fn same_line(&self, other: &LinkConfig) -> bool {
        self.baud == other.baud
            && self.data_bits == other.data_bits
            && self.parity == other.parity
            && self.stop_bits == other.stop_bits
    }

    /// e.g. `1200 7E1`
    pub fn label(&self) -> String {
        format!(
            "{} {}{}{}",
            self.baud.as_u32(),
            self.data_bits.as_u8(),
            self.parity.as_char(),
            self.stop_bits.as_u8()
        )
    }

    /// Mask applied to inbound bytes: the parity bit is noise on a 7-bit line.
    pub fn rx_mask(&self) -> u8 {
        match self.data_bits {
            DataBits::Seven => 0x7f,
            DataBits::Eight => 0xff,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::seven_e_one(BaudRate::B1200)
    }
}

impl fmt::Display for LinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
