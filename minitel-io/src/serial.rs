//! The physical serial port, through the `serialport` crate.

use crate::config::{DataBits, LinkConfig, Parity, StopBits};
use crate::error::LinkError;
use crate::link::Link;
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct SerialLink {
    port_name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("port_name", &self.port_name)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl SerialLink {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            port: None,
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, LinkError> {
        self.port.as_mut().ok_or(LinkError::NotOpen)
    }
}

impl Link for SerialLink {
    fn name(&self) -> &str {
        &self.port_name
    }

    fn open(&mut self, config: &LinkConfig) -> Result<(), LinkError> {
        self.close();

        let data_bits = match config.data_bits {
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        };
        let parity = match config.parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
        };
        let stop_bits = match config.stop_bits {
            StopBits::One => serialport::StopBits::One,
        };

        let port = serialport::new(&self.port_name, config.baud.as_u32())
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(serialport::FlowControl::None)
            .timeout(WRITE_TIMEOUT)
            .open()
            .map_err(|e| LinkError::Unavailable {
                port: self.port_name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!("Serial link open: {} @ {}", self.port_name, config.label());
        self.port = Some(port);
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, LinkError> {
        let port = self.port_mut()?;
        port.set_timeout(timeout)
            .map_err(|e| LinkError::Io(e.into()))?;

        let mut buf = [0u8; 1];
        match port.read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(None)
            }
            Err(e) => Err(LinkError::Io(e)),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let port = self.port_mut()?;
        port.set_timeout(WRITE_TIMEOUT)
            .map_err(|e| LinkError::Io(e.into()))?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::info!("Serial link closed: {}", self.port_name);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

/// Serial ports visible to the system, `/dev/cu.*` first (the macOS call-out devices).
pub fn available_ports() -> anyhow::Result<Vec<String>> {
    let ports = serialport::available_ports()?;
    let (mut cu, other): (Vec<String>, Vec<String>) = ports
        .into_iter()
        .map(|p| p.port_name)
        .partition(|name| name.starts_with("/dev/cu."));
    cu.extend(other);
    Ok(cu)
}
