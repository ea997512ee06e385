use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{de, Deserialize, Deserializer};
use snafu::{ResultExt, Snafu};
use yacc_common::NodeId;

/// Error returned when loading session configuration files
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// The file could not be read
    #[snafu(display("IO error loading {path}: {source:?}"))]
    Io {
        /// The file being read
        path: String,
        /// The cause
        source: std::io::Error,
    },
    /// The file is not valid TOML, or does not match the expected layout
    #[snafu(display("Error parsing TOML: {source}"))]
    TomlDeserialization {
        /// The cause
        source: toml::de::Error,
    },
}

/// The kind of CAN adapter the bus is reached through
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    /// A native socketcan interface
    #[default]
    SocketCan,
    /// PEAK-System PCAN adapter
    Peak,
    /// Kvaser adapter
    Kvaser,
    /// IXXAT adapter
    Ixxat,
}

impl InterfaceKind {
    /// The channel used when none is configured
    ///
    /// On Linux every supported adapter is exposed as a socketcan network interface
    pub fn default_channel(&self) -> &'static str {
        match self {
            InterfaceKind::SocketCan
            | InterfaceKind::Peak
            | InterfaceKind::Kvaser
            | InterfaceKind::Ixxat => "can0",
        }
    }
}

impl core::fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            InterfaceKind::SocketCan => write!(f, "socketcan"),
            InterfaceKind::Peak => write!(f, "peak"),
            InterfaceKind::Kvaser => write!(f, "kvaser"),
            InterfaceKind::Ixxat => write!(f, "ixxat"),
        }
    }
}

impl core::str::FromStr for InterfaceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "socketcan" => Ok(InterfaceKind::SocketCan),
            "peak" => Ok(InterfaceKind::Peak),
            "kvaser" => Ok(InterfaceKind::Kvaser),
            "ixxat" => Ok(InterfaceKind::Ixxat),
            _ => Err(format!("unknown interface '{s}'")),
        }
    }
}

/// Where the node is reached
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BusConfig {
    /// Adapter kind
    pub interface: InterfaceKind,
    /// Channel name; the interface default when not set
    pub channel: Option<String>,
    /// Bus bitrate in bit/s
    pub bitrate: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            interface: InterfaceKind::default(),
            channel: None,
            bitrate: 250_000,
        }
    }
}

impl BusConfig {
    /// The channel to open
    pub fn channel(&self) -> &str {
        self.channel
            .as_deref()
            .unwrap_or_else(|| self.interface.default_channel())
    }
}

/// The node being configured
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NodeSection {
    /// The node ID
    #[serde(deserialize_with = "deserialize_node_id")]
    pub id: NodeId,
    /// EDS/DCF file describing the node's object dictionary
    pub object_dictionary: Option<PathBuf>,
}

/// Protocol timeouts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Timeouts {
    /// Time to wait for an SDO response, in milliseconds
    pub sdo_ms: u64,
    /// Time to wait for a heartbeat after an NMT command, in milliseconds
    pub heartbeat_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            sdo_ms: 1000,
            heartbeat_ms: 3000,
        }
    }
}

impl Timeouts {
    /// SDO response timeout
    pub fn sdo(&self) -> Duration {
        Duration::from_millis(self.sdo_ms)
    }

    /// Heartbeat timeout
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

/// Everything needed to open a [Session](crate::Session)
///
/// Stored as TOML:
///
/// ```toml
/// [bus]
/// interface = "socketcan"
/// channel = "can0"
/// bitrate = 250000
///
/// [node]
/// id = 5
/// object_dictionary = "drive.eds"
///
/// [timeouts]
/// sdo_ms = 1000
/// heartbeat_ms = 3000
/// ```
///
/// Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SessionConfig {
    /// Bus settings
    pub bus: BusConfig,
    /// Node settings
    pub node: NodeSection,
    /// Timeouts
    pub timeouts: Timeouts,
}

impl SessionConfig {
    /// Read a configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<SessionConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(IoSnafu {
            path: path.to_string_lossy(),
        })?;
        Self::load_from_str(&content)
    }

    /// Read a configuration from a string
    pub fn load_from_str(s: &str) -> Result<SessionConfig, ConfigError> {
        toml::from_str(s).context(TomlDeserializationSnafu)
    }
}

fn deserialize_node_id<'de, D>(deserializer: D) -> Result<NodeId, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = u8::deserialize(deserializer)?;
    NodeId::new(raw).map_err(|_| {
        de::Error::invalid_value(de::Unexpected::Unsigned(raw as u64), &"a node ID in 1..=127")
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_session_config_parse() {
        let str = r#"
        [bus]
        interface = "peak"
        bitrate = 500000

        [node]
        id = 5
        object_dictionary = "drive.eds"

        [timeouts]
        sdo_ms = 200
        "#;

        let config = match SessionConfig::load_from_str(str) {
            Ok(config) => config,
            Err(e) => {
                println!("{}", e);
                panic!("Failed to parse config");
            }
        };

        assert_eq!(InterfaceKind::Peak, config.bus.interface);
        assert_eq!("can0", config.bus.channel());
        assert_eq!(500_000, config.bus.bitrate);
        assert_eq!(5, config.node.id.raw());
        assert_eq!(Some(PathBuf::from("drive.eds")), config.node.object_dictionary);
        assert_eq!(Duration::from_millis(200), config.timeouts.sdo());
        assert_eq!(Duration::from_millis(3000), config.timeouts.heartbeat());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SessionConfig::load_from_str("").unwrap();
        assert_eq!(SessionConfig::default(), config);
        assert_eq!(1, config.node.id.raw());
        assert_eq!(250_000, config.bus.bitrate);
    }

    #[test]
    fn test_out_of_range_node_id() {
        let str = r#"
        [node]
        id = 128
        "#;

        let result = SessionConfig::load_from_str(str);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("a node ID in 1..=127"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let str = r#"
        [bus]
        speed = 10
        "#;
        assert!(SessionConfig::load_from_str(str).is_err());
    }
}
