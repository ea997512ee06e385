//! Expedited SDO framing
//!
//! Only the expedited (up to 4 byte) transfers are encoded here. Segmented and block transfers are
//! left to a full SDO stack; a server offering a segmented upload is answered with an abort.
use crate::messages::{CanId, CanMessage};

/// Specifies the possible server command specifier (SCS) values in SDO response packets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerCommand {
    /// Segment upload response
    SegmentUpload = 0,
    /// Segment download acknowledge
    SegmentDownload = 1,
    /// Initiate upload response
    Upload = 2,
    /// Acknowledge a download command
    Download = 3,
    /// Abort transfer
    Abort = 4,
}

impl TryFrom<u8> for ServerCommand {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ServerCommand::*;
        match value {
            0 => Ok(SegmentUpload),
            1 => Ok(SegmentDownload),
            2 => Ok(Upload),
            3 => Ok(Download),
            4 => Ok(Abort),
            _ => Err(()),
        }
    }
}

/// Specifies the client command specifier (CCS) values in SDO request packets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientCommand {
    /// Download segment
    DownloadSegment = 0,
    /// Initiate download
    InitiateDownload = 1,
    /// Initiate upload
    InitiateUpload = 2,
    /// Request upload segment
    ReqUploadSegment = 3,
    /// Abort transfer
    Abort = 4,
}

impl TryFrom<u8> for ClientCommand {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ClientCommand::*;
        match value {
            0 => Ok(DownloadSegment),
            1 => Ok(InitiateDownload),
            2 => Ok(InitiateUpload),
            3 => Ok(ReqUploadSegment),
            4 => Ok(Abort),
            _ => Err(()),
        }
    }
}

/// SDO abort codes defined by CiA 301
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum AbortCode {
    /// Toggle bit not alternated
    ToggleNotAlternated = 0x0503_0000,
    /// SDO protocol timed out
    SdoTimeout = 0x0504_0000,
    /// Client/server command specifier not valid or unknown
    InvalidCommandSpecifier = 0x0504_0001,
    /// Out of memory
    OutOfMemory = 0x0504_0005,
    /// Unsupported access to an object
    UnsupportedAccess = 0x0601_0000,
    /// Attempt to read a write only object
    WriteOnly = 0x0601_0001,
    /// Attempt to write a read only object
    ReadOnly = 0x0601_0002,
    /// Object does not exist in the dictionary
    NoSuchObject = 0x0602_0000,
    /// Object cannot be mapped to the PDO
    UnallowedPdo = 0x0604_0041,
    /// The number and length of objects would exceed PDO length
    PdoTooLong = 0x0604_0042,
    /// General parameter incompatibility
    IncompatibleParameter = 0x0604_0043,
    /// Access failed due to hardware error
    HardwareError = 0x0606_0000,
    /// Data type does not match, length of service parameter does not match
    DataTypeMismatch = 0x0607_0010,
    /// Data type does not match, length of service parameter too high
    DataTypeMismatchLengthHigh = 0x0607_0012,
    /// Data type does not match, length of service parameter too low
    DataTypeMismatchLengthLow = 0x0607_0013,
    /// Sub-index does not exist
    NoSuchSubIndex = 0x0609_0011,
    /// Invalid value for parameter (download only)
    InvalidValue = 0x0609_0030,
    /// Value of parameter too high (download only)
    ValueTooHigh = 0x0609_0031,
    /// Value of parameter too low (download only)
    ValueTooLow = 0x0609_0032,
    /// Resource not available: SDO connection
    ResourceNotAvailable = 0x060A_0023,
    /// General error
    GeneralError = 0x0800_0000,
    /// Data cannot be transferred or stored to the application
    CantStore = 0x0800_0020,
    /// Data cannot be transferred or stored to the application because of local control
    CantStoreLocalControl = 0x0800_0021,
    /// Data cannot be transferred or stored to the application because of the device state
    CantStoreDeviceState = 0x0800_0022,
    /// No object dictionary is present
    NoObjectDict = 0x0800_0023,
    /// No data available
    NoData = 0x0800_0024,
}

impl AbortCode {
    const ALL: [AbortCode; 26] = [
        AbortCode::ToggleNotAlternated,
        AbortCode::SdoTimeout,
        AbortCode::InvalidCommandSpecifier,
        AbortCode::OutOfMemory,
        AbortCode::UnsupportedAccess,
        AbortCode::WriteOnly,
        AbortCode::ReadOnly,
        AbortCode::NoSuchObject,
        AbortCode::UnallowedPdo,
        AbortCode::PdoTooLong,
        AbortCode::IncompatibleParameter,
        AbortCode::HardwareError,
        AbortCode::DataTypeMismatch,
        AbortCode::DataTypeMismatchLengthHigh,
        AbortCode::DataTypeMismatchLengthLow,
        AbortCode::NoSuchSubIndex,
        AbortCode::InvalidValue,
        AbortCode::ValueTooHigh,
        AbortCode::ValueTooLow,
        AbortCode::ResourceNotAvailable,
        AbortCode::GeneralError,
        AbortCode::CantStore,
        AbortCode::CantStoreLocalControl,
        AbortCode::CantStoreDeviceState,
        AbortCode::NoObjectDict,
        AbortCode::NoData,
    ];

    /// Look up a known abort code from its raw value
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|code| *code as u32 == raw)
    }

    /// A short human readable description
    pub fn description(&self) -> &'static str {
        use AbortCode::*;
        match self {
            ToggleNotAlternated => "toggle bit not alternated",
            SdoTimeout => "SDO protocol timed out",
            InvalidCommandSpecifier => "command specifier not valid or unknown",
            OutOfMemory => "out of memory",
            UnsupportedAccess => "unsupported access to an object",
            WriteOnly => "attempt to read a write only object",
            ReadOnly => "attempt to write a read only object",
            NoSuchObject => "object does not exist in the object dictionary",
            UnallowedPdo => "object cannot be mapped to the PDO",
            PdoTooLong => "number and length of mapped objects exceed PDO length",
            IncompatibleParameter => "general parameter incompatibility",
            HardwareError => "access failed due to a hardware error",
            DataTypeMismatch => "data type or length does not match",
            DataTypeMismatchLengthHigh => "length of service parameter too high",
            DataTypeMismatchLengthLow => "length of service parameter too low",
            NoSuchSubIndex => "sub-index does not exist",
            InvalidValue => "invalid value for parameter",
            ValueTooHigh => "value of parameter written too high",
            ValueTooLow => "value of parameter written too low",
            ResourceNotAvailable => "resource not available",
            GeneralError => "general error",
            CantStore => "data cannot be transferred or stored to the application",
            CantStoreLocalControl => "data cannot be stored because of local control",
            CantStoreDeviceState => "data cannot be stored because of the device state",
            NoObjectDict => "no object dictionary is present",
            NoData => "no data available",
        }
    }
}

/// Describe a raw abort code, falling back to "unknown abort code"
pub fn abort_description(raw: u32) -> &'static str {
    AbortCode::from_raw(raw)
        .map(|code| code.description())
        .unwrap_or("unknown abort code")
}

/// An SDO request sent from the client to a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdoRequest {
    /// Initiate a download; only expedited transfers are built by this crate
    InitiateDownload {
        /// Number of unused bytes in data
        n: u8,
        /// Expedited
        e: bool,
        /// size valid
        s: bool,
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// data (value on expedited, size when e=0 and s=1)
        data: [u8; 4],
    },
    /// Initiate an upload
    InitiateUpload {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
    },
    /// Abort a transfer
    Abort {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Reason
        abort_code: u32,
    },
}

impl SdoRequest {
    /// Create an abort message
    pub fn abort(index: u16, sub: u8, abort_code: AbortCode) -> Self {
        SdoRequest::Abort {
            index,
            sub,
            abort_code: abort_code as u32,
        }
    }

    /// Create an expedited download message
    ///
    /// Returns None if `data` does not fit into an expedited transfer
    pub fn expedited_download(index: u16, sub: u8, data: &[u8]) -> Option<Self> {
        if data.is_empty() || data.len() > 4 {
            return None;
        }
        let mut msg_data = [0; 4];
        msg_data[0..data.len()].copy_from_slice(data);

        Some(SdoRequest::InitiateDownload {
            n: (4 - data.len()) as u8,
            e: true,
            s: true,
            index,
            sub,
            data: msg_data,
        })
    }

    /// Create an initiate upload message
    pub fn initiate_upload(index: u16, sub: u8) -> Self {
        SdoRequest::InitiateUpload { index, sub }
    }

    /// Serialize the request into a CAN message
    pub fn to_can_message(self, id: CanId) -> CanMessage {
        let mut payload = [0; 8];

        match self {
            SdoRequest::InitiateDownload {
                n,
                e,
                s,
                index,
                sub,
                data,
            } => {
                payload[0] = (ClientCommand::InitiateDownload as u8) << 5
                    | ((n & 0x3) << 2)
                    | ((e as u8) << 1)
                    | s as u8;
                payload[1..3].copy_from_slice(&index.to_le_bytes());
                payload[3] = sub;
                payload[4..8].copy_from_slice(&data);
            }
            SdoRequest::InitiateUpload { index, sub } => {
                payload[0] = (ClientCommand::InitiateUpload as u8) << 5;
                payload[1..3].copy_from_slice(&index.to_le_bytes());
                payload[3] = sub;
            }
            SdoRequest::Abort {
                index,
                sub,
                abort_code,
            } => {
                payload[0] = (ClientCommand::Abort as u8) << 5;
                payload[1..3].copy_from_slice(&index.to_le_bytes());
                payload[3] = sub;
                payload[4..8].copy_from_slice(&abort_code.to_le_bytes());
            }
        }

        CanMessage::new(id, &payload)
    }
}

impl TryFrom<&[u8]> for SdoRequest {
    type Error = AbortCode;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() < 8 {
            return Err(AbortCode::DataTypeMismatchLengthLow);
        }
        let index = u16::from_le_bytes([value[1], value[2]]);
        let sub = value[3];
        let ccs = ClientCommand::try_from(value[0] >> 5)
            .map_err(|_| AbortCode::InvalidCommandSpecifier)?;

        match ccs {
            ClientCommand::InitiateDownload => {
                let mut data = [0; 4];
                data.copy_from_slice(&value[4..8]);
                Ok(SdoRequest::InitiateDownload {
                    n: (value[0] >> 2) & 0x3,
                    e: (value[0] & (1 << 1)) != 0,
                    s: (value[0] & (1 << 0)) != 0,
                    index,
                    sub,
                    data,
                })
            }
            ClientCommand::InitiateUpload => Ok(SdoRequest::InitiateUpload { index, sub }),
            ClientCommand::Abort => Ok(SdoRequest::Abort {
                index,
                sub,
                abort_code: u32::from_le_bytes([value[4], value[5], value[6], value[7]]),
            }),
            ClientCommand::DownloadSegment | ClientCommand::ReqUploadSegment => {
                Err(AbortCode::InvalidCommandSpecifier)
            }
        }
    }
}

/// An SDO response sent from a server back to the client
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SdoResponse {
    /// Response to an initiate upload
    ConfirmUpload {
        /// Number of unused bytes in data
        n: u8,
        /// Expedited flag
        e: bool,
        /// size flag
        s: bool,
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Value if e=1, or size if s=1
        data: [u8; 4],
    },
    /// Acknowledge of an initiate download
    ConfirmDownload {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
    },
    /// The server aborted the transfer
    Abort {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Reason
        abort_code: u32,
    },
}

impl SdoResponse {
    /// Build an expedited upload response
    ///
    /// Returns None if `data` does not fit into an expedited transfer
    pub fn expedited_upload(index: u16, sub: u8, data: &[u8]) -> Option<SdoResponse> {
        if data.is_empty() || data.len() > 4 {
            return None;
        }

        let mut msg_data = [0; 4];
        msg_data[0..data.len()].copy_from_slice(data);

        Some(SdoResponse::ConfirmUpload {
            index,
            sub,
            e: true,
            s: true,
            n: 4 - data.len() as u8,
            data: msg_data,
        })
    }

    /// Build a download acknowledge
    pub fn download_acknowledge(index: u16, sub: u8) -> SdoResponse {
        SdoResponse::ConfirmDownload { index, sub }
    }

    /// Build an abort response
    pub fn abort(index: u16, sub: u8, abort_code: AbortCode) -> SdoResponse {
        SdoResponse::Abort {
            index,
            sub,
            abort_code: abort_code as u32,
        }
    }

    /// The object the response refers to
    pub fn object(&self) -> (u16, u8) {
        match *self {
            SdoResponse::ConfirmUpload { index, sub, .. }
            | SdoResponse::ConfirmDownload { index, sub }
            | SdoResponse::Abort { index, sub, .. } => (index, sub),
        }
    }

    /// Serialize the response into a CAN message
    pub fn to_can_message(self, id: CanId) -> CanMessage {
        let mut payload = [0; 8];

        match self {
            SdoResponse::ConfirmUpload {
                n,
                e,
                s,
                index,
                sub,
                data,
            } => {
                payload[0] = (ServerCommand::Upload as u8) << 5
                    | ((n & 0x3) << 2)
                    | ((e as u8) << 1)
                    | (s as u8);
                payload[1..3].copy_from_slice(&index.to_le_bytes());
                payload[3] = sub;
                payload[4..8].copy_from_slice(&data);
            }
            SdoResponse::ConfirmDownload { index, sub } => {
                payload[0] = (ServerCommand::Download as u8) << 5;
                payload[1..3].copy_from_slice(&index.to_le_bytes());
                payload[3] = sub;
            }
            SdoResponse::Abort {
                index,
                sub,
                abort_code,
            } => {
                payload[0] = (ServerCommand::Abort as u8) << 5;
                payload[1..3].copy_from_slice(&index.to_le_bytes());
                payload[3] = sub;
                payload[4..8].copy_from_slice(&abort_code.to_le_bytes());
            }
        }
        CanMessage::new(id, &payload)
    }
}

impl TryFrom<CanMessage> for SdoResponse {
    type Error = ();

    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        let payload = msg.data();
        if payload.len() < 8 {
            return Err(());
        }
        let index = u16::from_le_bytes([payload[1], payload[2]]);
        let sub = payload[3];
        let mut data = [0u8; 4];
        data.copy_from_slice(&payload[4..8]);

        match ServerCommand::try_from(payload[0] >> 5)? {
            ServerCommand::Upload => Ok(SdoResponse::ConfirmUpload {
                n: (payload[0] >> 2) & 0x3,
                e: (payload[0] & (1 << 1)) != 0,
                s: (payload[0] & (1 << 0)) != 0,
                index,
                sub,
                data,
            }),
            ServerCommand::Download => Ok(SdoResponse::ConfirmDownload { index, sub }),
            ServerCommand::Abort => Ok(SdoResponse::Abort {
                index,
                sub,
                abort_code: u32::from_le_bytes(data),
            }),
            // Segment responses only occur inside a segmented transfer, which is never started
            ServerCommand::SegmentUpload | ServerCommand::SegmentDownload => Err(()),
        }
    }
}
