use crate::domain::error::{HubError, HubResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parity setting for a serial endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

/// Stop bits setting for a serial endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

/// Parsed serial endpoint parameters.
///
/// The textual form is `name[:baud[,dataBits[,parity[,stopBits]]]]`, e.g.
/// `COM5:19200,7,E,2` or `/dev/ttyUSB0`. Missing or empty trailing fields
/// take the defaults 9600/8/N/1. `Display` renders the canonical form with
/// all four suffix fields, so `parse(format(cfg)) == cfg`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    pub name: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_DATA_BITS: u8 = 8;

impl PortConfig {
    /// Config for `name` with all parameters at their defaults.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DEFAULT_DATA_BITS,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl Parity {
    fn letter(&self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        }
    }

    /// Unrecognized letters fall back to `None`.
    fn from_field(field: &str) -> Self {
        match field.trim().to_ascii_uppercase().as_str() {
            "O" => Parity::Odd,
            "E" => Parity::Even,
            "M" => Parity::Mark,
            "S" => Parity::Space,
            _ => Parity::None,
        }
    }
}

impl StopBits {
    fn label(&self) -> &'static str {
        match self {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        }
    }

    /// Anything other than `1`, `1.5` or `2` falls back to `One`.
    fn from_field(field: &str) -> Self {
        match field.trim() {
            "1.5" => StopBits::OnePointFive,
            "2" => StopBits::Two,
            _ => StopBits::One,
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl fmt::Display for PortConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{},{},{},{}",
            self.name, self.baud_rate, self.data_bits, self.parity, self.stop_bits
        )
    }
}

impl FromStr for PortConfig {
    type Err = HubError;

    fn from_str(spec: &str) -> HubResult<Self> {
        let (name, suffix) = match spec.split_once(':') {
            Some((name, suffix)) => (name, Some(suffix)),
            None => (spec, None),
        };

        if name.is_empty() {
            return Err(HubError::Config {
                message: format!("'{}': missing device name", spec),
            });
        }

        let mut config = PortConfig::new(name);

        if let Some(suffix) = suffix {
            let fields: Vec<&str> = suffix.split(',').collect();
            if fields.len() > 4 {
                return Err(HubError::Config {
                    message: format!("'{}': too many fields after ':'", spec),
                });
            }

            if let Some(field) = fields.first().filter(|f| !f.trim().is_empty()) {
                config.baud_rate = field.trim().parse().map_err(|_| HubError::Config {
                    message: format!("'{}': invalid baud rate '{}'", spec, field),
                })?;
            }
            if let Some(field) = fields.get(1).filter(|f| !f.trim().is_empty()) {
                config.data_bits = field.trim().parse().map_err(|_| HubError::Config {
                    message: format!("'{}': invalid data bits '{}'", spec, field),
                })?;
            }
            if let Some(field) = fields.get(2) {
                config.parity = Parity::from_field(field);
            }
            if let Some(field) = fields.get(3) {
                config.stop_bits = StopBits::from_field(field);
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_full_spec_parses() {
        let config: PortConfig = "COM5:19200,7,E,2".parse().unwrap();
        assert_eq!(
            config,
            PortConfig {
                name: "COM5".to_string(),
                baud_rate: 19200,
                data_bits: 7,
                parity: Parity::Even,
                stop_bits: StopBits::Two,
            }
        );
        assert_eq!(config.to_string(), "COM5:19200,7,E,2");
    }

    #[test]
    fn test_bare_name_takes_defaults() {
        let config: PortConfig = "/dev/ttyUSB0".parse().unwrap();
        assert_eq!(config, PortConfig::new("/dev/ttyUSB0"));
        assert_eq!(config.to_string(), "/dev/ttyUSB0:9600,8,N,1");
    }

    #[test]
    fn test_empty_fields_take_defaults() {
        let config: PortConfig = "COM3:,7".parse().unwrap();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.data_bits, 7);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
    }

    #[test]
    fn test_partial_suffix() {
        let config: PortConfig = "COM1:115200".parse().unwrap();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.data_bits, 8);
    }

    #[test]
    fn test_parity_letters_case_insensitive() {
        for (field, parity) in [
            ("n", Parity::None),
            ("o", Parity::Odd),
            ("e", Parity::Even),
            ("m", Parity::Mark),
            ("s", Parity::Space),
            ("E", Parity::Even),
        ] {
            let config: PortConfig = format!("COM1:9600,8,{}", field).parse().unwrap();
            assert_eq!(config.parity, parity, "field '{}'", field);
        }
    }

    #[test]
    fn test_unrecognized_parity_defaults_to_none() {
        let config: PortConfig = "COM1:9600,8,X".parse().unwrap();
        assert_eq!(config.parity, Parity::None);
    }

    #[test]
    fn test_stop_bits_values() {
        for (field, stop_bits) in [
            ("1", StopBits::One),
            ("1.5", StopBits::OnePointFive),
            ("2", StopBits::Two),
            ("3", StopBits::One),
        ] {
            let config: PortConfig = format!("COM1:9600,8,N,{}", field).parse().unwrap();
            assert_eq!(config.stop_bits, stop_bits, "field '{}'", field);
        }
    }

    #[test]
    fn test_invalid_numeric_fields_fail() {
        assert!("COM1:fast".parse::<PortConfig>().is_err());
        assert!("COM1:9600,eight".parse::<PortConfig>().is_err());
    }

    #[test]
    fn test_structurally_invalid_specs_fail() {
        assert!("".parse::<PortConfig>().is_err());
        assert!(":9600".parse::<PortConfig>().is_err());
        assert!("COM1:9600,8,N,1,extra".parse::<PortConfig>().is_err());
    }

    fn parity_strategy() -> impl Strategy<Value = Parity> {
        prop_oneof![
            Just(Parity::None),
            Just(Parity::Odd),
            Just(Parity::Even),
            Just(Parity::Mark),
            Just(Parity::Space),
        ]
    }

    fn stop_bits_strategy() -> impl Strategy<Value = StopBits> {
        prop_oneof![
            Just(StopBits::One),
            Just(StopBits::OnePointFive),
            Just(StopBits::Two),
        ]
    }

    proptest! {
        #[test]
        fn prop_parse_format_round_trip(
            name in "[A-Za-z0-9_/.-]{1,20}",
            baud_rate in 1u32..=4_000_000,
            data_bits in 5u8..=8,
            parity in parity_strategy(),
            stop_bits in stop_bits_strategy(),
        ) {
            let config = PortConfig { name, baud_rate, data_bits, parity, stop_bits };
            let round_tripped: PortConfig = config.to_string().parse().unwrap();
            prop_assert_eq!(round_tripped, config);
        }
    }
}
