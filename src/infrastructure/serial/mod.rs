// Serial module - serialport-backed endpoints
use crate::core::relay::ByteEndpoint;
use crate::domain::error::{HubError, HubResult};
use crate::domain::port::{Parity, PortConfig, StopBits};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::info;

/// A serial port handle usable as a relay endpoint. Reads return
/// `ErrorKind::TimedOut` after the configured timeout when no data arrived.
pub struct SerialEndpoint {
    port: Box<dyn SerialPort>,
}

impl ByteEndpoint for SerialEndpoint {
    fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }

    fn write_chunk(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.port.write_all(data)
    }
}

/// Open `config`'s device twice over: a read handle and a cloned write
/// handle, so one relay task can own each side without sharing a lock.
///
/// Open failures surface as `PortUnavailable`. Parameter combinations the
/// backend cannot express (Mark/Space parity, 1.5 stop bits) are rejected
/// up front as `Config` errors.
pub fn open_endpoint(
    config: &PortConfig,
    read_timeout: Duration,
) -> HubResult<(Box<dyn ByteEndpoint>, Box<dyn ByteEndpoint>)> {
    let mut builder = serialport::new(&config.name, config.baud_rate);

    builder = builder.data_bits(match config.data_bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        8 => serialport::DataBits::Eight,
        other => {
            return Err(HubError::Config {
                message: format!("'{}': unsupported data bits {}", config.name, other),
            })
        }
    });

    builder = builder.parity(match config.parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
        Parity::Mark | Parity::Space => {
            return Err(HubError::Config {
                message: format!(
                    "'{}': {} parity is not supported on this platform",
                    config.name, config.parity
                ),
            })
        }
    });

    builder = builder.stop_bits(match config.stop_bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
        StopBits::OnePointFive => {
            return Err(HubError::Config {
                message: format!(
                    "'{}': 1.5 stop bits are not supported on this platform",
                    config.name
                ),
            })
        }
    });

    builder = builder.timeout(read_timeout);

    let reader = builder.open().map_err(|e| HubError::PortUnavailable {
        message: format!("{}: {}", config.name, e),
    })?;
    let writer = reader.try_clone().map_err(|e| HubError::PortUnavailable {
        message: format!("{}: {}", config.name, e),
    })?;

    info!("Opened serial port {}", config);

    Ok((
        Box::new(SerialEndpoint { port: reader }),
        Box::new(SerialEndpoint { port: writer }),
    ))
}

/// Names of the serial devices currently present on the system.
pub fn available_ports() -> HubResult<Vec<String>> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_nonexistent_device_is_port_unavailable() {
        let config = PortConfig::new("/dev/serialhub-does-not-exist");
        let result = open_endpoint(&config, Duration::from_millis(100));
        assert!(matches!(result, Err(HubError::PortUnavailable { .. })));
    }

    #[test]
    fn test_unsupported_parameters_are_config_errors() {
        let mut config = PortConfig::new("/dev/serialhub-does-not-exist");
        config.parity = Parity::Mark;
        let result = open_endpoint(&config, Duration::from_millis(100));
        assert!(matches!(result, Err(HubError::Config { .. })));

        let mut config = PortConfig::new("/dev/serialhub-does-not-exist");
        config.stop_bits = StopBits::OnePointFive;
        let result = open_endpoint(&config, Duration::from_millis(100));
        assert!(matches!(result, Err(HubError::Config { .. })));

        let mut config = PortConfig::new("/dev/serialhub-does-not-exist");
        config.data_bits = 9;
        let result = open_endpoint(&config, Duration::from_millis(100));
        assert!(matches!(result, Err(HubError::Config { .. })));
    }
}
