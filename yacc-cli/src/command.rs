use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use std::path::PathBuf;
use yacc_client::{
    common::{
        objects::DataType,
        value::{
            encode_from_float, encode_from_hex, encode_from_signed, encode_from_unsigned, View,
        },
        Data, NodeId,
    },
    ConfigError, InterfaceKind, SessionConfig,
};

#[derive(Debug, Parser)]
#[command(name = "yacc", version, about = "Configure a CANopen node over SDO")]
pub struct Cli {
    #[command(flatten)]
    pub bus: BusArgs,
    /// Increase log output (-v for info, -vv for debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// The log level selected by the verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

/// Settings for reaching the node, layered over the config file
#[derive(Debug, Args)]
pub struct BusArgs {
    /// Path to a session config TOML file
    #[arg(short, long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Kind of CAN adapter (socketcan, peak, kvaser, ixxat)
    #[arg(long, global = true)]
    pub interface: Option<InterfaceKind>,
    /// CAN channel, e.g. 'can0'
    #[arg(long, global = true)]
    pub channel: Option<String>,
    /// Bus bitrate in bit/s
    #[arg(long, global = true)]
    pub bitrate: Option<u32>,
    /// ID of the node to configure
    #[arg(short, long, global = true, value_parser = parse_node_id)]
    pub node_id: Option<NodeId>,
    /// EDS or DCF file describing the node's object dictionary
    #[arg(long = "od", global = true, value_hint = clap::ValueHint::FilePath)]
    pub object_dictionary: Option<PathBuf>,
}

impl BusArgs {
    /// Load the config file, if any, and apply the command line overrides
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load_from_file(path)?,
            None => SessionConfig::default(),
        };
        if let Some(interface) = self.interface {
            config.bus.interface = interface;
        }
        if let Some(channel) = &self.channel {
            config.bus.channel = Some(channel.clone());
        }
        if let Some(bitrate) = self.bitrate {
            config.bus.bitrate = bitrate;
        }
        if let Some(node_id) = self.node_id {
            config.node.id = node_id;
        }
        if let Some(path) = &self.object_dictionary {
            config.node.object_dictionary = Some(path.clone());
        }
        Ok(config)
    }
}

fn parse_node_id(s: &str) -> Result<NodeId, String> {
    let raw = clap_num::maybe_hex::<u8>(s)?;
    NodeId::new(raw).map_err(|e| e.to_string())
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Read every object of the object dictionary from the node and write them to a DCF
    Upload(UploadArgs),
    /// Write every read-write object of a DCF to the node
    Download(DownloadArgs),
    /// Read one object
    Read(ReadArgs),
    /// Write one object
    Write(WriteArgs),
    /// Store the node's current parameters in non-volatile memory
    Save,
    /// Restore the node's default parameters
    RestoreDefaults,
    /// List the objects of the object dictionary
    Groups,
    /// List the entries of one object
    Entries(EntriesArgs),
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// DCF file to write
    #[arg(short, long, default_value = "upload.dcf", value_hint = clap::ValueHint::FilePath)]
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// DCF or EDS file to download
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub file: PathBuf,
    /// Save the parameters on the node once the download completes
    #[arg(long)]
    pub save: bool,
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    /// Object index
    #[arg(value_parser = clap_num::maybe_hex::<u16>)]
    pub index: u16,
    /// Sub index
    #[arg(value_parser = clap_num::maybe_hex::<u8>)]
    pub sub: u8,
}

/// How the value argument of a write is interpreted
#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub enum ValueFormat {
    /// Big-endian hex digits, as displayed by `read`
    Hex,
    /// Single precision float
    Float,
    /// Unsigned integer, decimal or 0x prefixed hex
    Unsigned,
    /// Signed decimal integer
    Signed,
}

impl ValueFormat {
    /// The format matching an object's data type, hex when unknown
    pub fn for_type(data_type: Option<DataType>) -> Self {
        match data_type.map(Data::preferred_view) {
            Some(View::Unsigned) => ValueFormat::Unsigned,
            Some(View::Signed) => ValueFormat::Signed,
            Some(View::Float) => ValueFormat::Float,
            Some(View::Hex) | None => ValueFormat::Hex,
        }
    }
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    /// Object index
    #[arg(value_parser = clap_num::maybe_hex::<u16>)]
    pub index: u16,
    /// Sub index
    #[arg(value_parser = clap_num::maybe_hex::<u8>)]
    pub sub: u8,
    /// The value to write
    #[arg(allow_hyphen_values = true)]
    pub value: String,
    /// How to read the value; defaults to the object's data type, or hex
    #[arg(long, value_enum)]
    pub format: Option<ValueFormat>,
    /// Number of bytes to write; defaults to the size of the object's data type
    #[arg(long)]
    pub len: Option<usize>,
}

impl WriteArgs {
    /// Convert the value to wire bytes
    ///
    /// `data_type` is the object's type in the dictionary, if it is described there.
    pub fn encode(&self, data_type: Option<DataType>) -> Result<Vec<u8>, String> {
        let format = self
            .format
            .unwrap_or_else(|| ValueFormat::for_type(data_type));
        let length = || {
            self.len
                .or_else(|| data_type.and_then(|dt| dt.size()))
                .ok_or_else(|| {
                    format!(
                        "Size of {:04X}sub{:X} is unknown, pass --len",
                        self.index, self.sub
                    )
                })
        };
        let result = match format {
            ValueFormat::Float => {
                let value = self.value.parse::<f32>().map_err(|e| e.to_string())?;
                return Ok(encode_from_float(value));
            }
            ValueFormat::Hex => encode_from_hex(&self.value, length()?),
            ValueFormat::Unsigned => {
                encode_from_unsigned(clap_num::maybe_hex::<u64>(&self.value)?, length()?)
            }
            ValueFormat::Signed => encode_from_signed(
                self.value.parse::<i64>().map_err(|e| e.to_string())?,
                length()?,
            ),
        };
        result.map_err(|e| e.to_string())
    }
}

#[derive(Debug, Args)]
pub struct EntriesArgs {
    /// Name of the object
    pub group: String,
}
