//! CAN message types and the NMT / heartbeat messages used by the configurator
use snafu::Snafu;

/// A CAN identifier
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CanId {
    Extended(u32),
    Std(u16),
}

impl CanId {
    /// Create an extended (29-bit) ID
    pub const fn extended(id: u32) -> CanId {
        CanId::Extended(id)
    }

    /// Create a standard (11-bit) ID
    pub const fn std(id: u16) -> CanId {
        CanId::Std(id)
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u32 {
        match self {
            CanId::Extended(id) => *id,
            CanId::Std(id) => *id as u32,
        }
    }

    /// Returns true for extended IDs
    pub fn is_extended(&self) -> bool {
        match self {
            CanId::Extended(_) => true,
            CanId::Std(_) => false,
        }
    }
}

const MAX_DATA_LENGTH: usize = 8;

/// A classic CAN data frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanMessage {
    /// Payload buffer; only the first `dlc` bytes are valid
    pub data: [u8; MAX_DATA_LENGTH],
    /// Number of valid payload bytes
    pub dlc: u8,
    /// Frame identifier
    pub id: CanId,
}

impl Default for CanMessage {
    fn default() -> Self {
        Self {
            data: [0; MAX_DATA_LENGTH],
            dlc: 0,
            id: CanId::Std(0),
        }
    }
}

impl CanMessage {
    /// Create a new message
    ///
    /// Payload bytes beyond the classic CAN maximum of 8 are dropped
    pub fn new(id: CanId, data: &[u8]) -> Self {
        let dlc = data.len().min(MAX_DATA_LENGTH);
        let mut buf = [0u8; MAX_DATA_LENGTH];
        buf[0..dlc].copy_from_slice(&data[0..dlc]);

        Self {
            id,
            dlc: dlc as u8,
            data: buf,
        }
    }

    /// Get the message ID
    pub fn id(&self) -> CanId {
        self.id
    }

    /// Get the valid payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data[0..self.dlc as usize]
    }
}

/// Error returned when interpreting a [CanMessage] as a specific message type
#[derive(Debug, Clone, Copy, PartialEq, Snafu)]
pub enum MessageError {
    /// The message has fewer bytes than the message type requires
    MessageTooShort,
    /// A field holds a value that is not valid for it
    #[snafu(display("Invalid field value {value}"))]
    InvalidField {
        /// The offending value
        value: u8,
    },
    /// The message ID does not belong to the message type
    #[snafu(display("Unexpected COB ID {cob_id:?}, expected {expected:?}"))]
    UnexpectedId {
        /// The received ID
        cob_id: CanId,
        /// The ID that was expected
        expected: CanId,
    },
}

/// NMT command specifiers
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NmtCommandSpecifier {
    /// Enter operational
    Start = 1,
    /// Enter stopped
    Stop = 2,
    /// Enter pre-operational
    EnterPreOp = 128,
    /// Reset the application
    ResetApp = 129,
    /// Reset communications
    ResetComm = 130,
}

impl NmtCommandSpecifier {
    /// Parse a command specifier from its raw byte value
    pub fn from_byte(b: u8) -> Result<Self, MessageError> {
        match b {
            1 => Ok(Self::Start),
            2 => Ok(Self::Stop),
            128 => Ok(Self::EnterPreOp),
            129 => Ok(Self::ResetApp),
            130 => Ok(Self::ResetComm),
            _ => InvalidFieldSnafu { value: b }.fail(),
        }
    }

    /// Get the command which moves a node into `state`
    ///
    /// Returns None for [NmtState::Bootup], which cannot be commanded
    pub fn for_state(state: NmtState) -> Option<Self> {
        match state {
            NmtState::PreOperational => Some(Self::EnterPreOp),
            NmtState::Operational => Some(Self::Start),
            NmtState::Stopped => Some(Self::Stop),
            NmtState::Bootup => None,
        }
    }
}

/// COB ID used for NMT commands
pub const NMT_CMD_ID: CanId = CanId::Std(0);
/// Base COB ID for heartbeat messages (node ID is added)
pub const HEARTBEAT_ID: u16 = 0x700;
/// The default base ID for sending SDO requests (server node ID is added)
pub const SDO_REQ_BASE: u16 = 0x600;
/// The default base ID for sending SDO responses (server node ID is added)
pub const SDO_RESP_BASE: u16 = 0x580;

/// An NMT command message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NmtCommand {
    /// The command
    pub cs: NmtCommandSpecifier,
    /// The addressed node, or 0 for all nodes
    pub node: u8,
}

impl TryFrom<CanMessage> for NmtCommand {
    type Error = MessageError;

    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        let payload = msg.data();
        if msg.id() != NMT_CMD_ID {
            UnexpectedIdSnafu {
                cob_id: msg.id(),
                expected: NMT_CMD_ID,
            }
            .fail()
        } else if payload.len() >= 2 {
            let cs = NmtCommandSpecifier::from_byte(payload[0])?;
            let node = payload[1];
            Ok(NmtCommand { cs, node })
        } else {
            MessageTooShortSnafu.fail()
        }
    }
}

impl From<NmtCommand> for CanMessage {
    fn from(cmd: NmtCommand) -> Self {
        CanMessage::new(NMT_CMD_ID, &[cmd.cs as u8, cmd.node])
    }
}

/// The NMT state of a node
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum NmtState {
    Bootup = 0,
    Stopped = 4,
    Operational = 5,
    PreOperational = 127,
}

impl core::fmt::Display for NmtState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NmtState::Bootup => write!(f, "Bootup"),
            NmtState::Stopped => write!(f, "Stopped"),
            NmtState::Operational => write!(f, "Operational"),
            NmtState::PreOperational => write!(f, "PreOperational"),
        }
    }
}

impl TryFrom<u8> for NmtState {
    type Error = MessageError;

    /// Attempt to convert a u8 to an NmtState enum
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use NmtState::*;
        match value {
            x if x == Bootup as u8 => Ok(Bootup),
            x if x == Stopped as u8 => Ok(Stopped),
            x if x == Operational as u8 => Ok(Operational),
            x if x == PreOperational as u8 => Ok(PreOperational),
            _ => InvalidFieldSnafu { value }.fail(),
        }
    }
}

/// A heartbeat message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    /// The node sending the heartbeat
    pub node: u8,
    /// Toggle bit
    pub toggle: bool,
    /// The reported NMT state
    pub state: NmtState,
}

impl From<Heartbeat> for CanMessage {
    fn from(value: Heartbeat) -> Self {
        let mut byte = value.state as u8;
        if value.toggle {
            byte |= 1 << 7;
        }
        CanMessage::new(CanId::Std(HEARTBEAT_ID | value.node as u16), &[byte])
    }
}

impl TryFrom<CanMessage> for Heartbeat {
    type Error = MessageError;

    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        let raw_id = msg.id().raw();
        if msg.id().is_extended() || raw_id & !0x7f != HEARTBEAT_ID as u32 || raw_id == HEARTBEAT_ID as u32 {
            return UnexpectedIdSnafu {
                cob_id: msg.id(),
                expected: CanId::Std(HEARTBEAT_ID),
            }
            .fail();
        }
        let payload = msg.data();
        if payload.is_empty() {
            return MessageTooShortSnafu.fail();
        }
        Ok(Heartbeat {
            node: (raw_id & 0x7f) as u8,
            toggle: payload[0] & (1 << 7) != 0,
            state: NmtState::try_from(payload[0] & 0x7f)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nmt_command_encoding() {
        let msg: CanMessage = NmtCommand {
            cs: NmtCommandSpecifier::EnterPreOp,
            node: 5,
        }
        .into();
        assert_eq!(NMT_CMD_ID, msg.id());
        assert_eq!(&[0x80, 5], msg.data());

        let cmd = NmtCommand::try_from(msg).unwrap();
        assert_eq!(NmtCommandSpecifier::EnterPreOp, cmd.cs);
    }

    #[test]
    fn test_heartbeat_parse() {
        let msg = CanMessage::new(CanId::Std(0x705), &[0x80 | 127]);
        let hb = Heartbeat::try_from(msg).unwrap();
        assert_eq!(5, hb.node);
        assert!(hb.toggle);
        assert_eq!(NmtState::PreOperational, hb.state);

        // SDO response is not a heartbeat
        let msg = CanMessage::new(CanId::Std(0x585), &[0x60, 0, 0, 0, 0, 0, 0, 0]);
        assert!(Heartbeat::try_from(msg).is_err());
    }

    #[test]
    fn test_state_for_command() {
        assert_eq!(
            Some(NmtCommandSpecifier::EnterPreOp),
            NmtCommandSpecifier::for_state(NmtState::PreOperational)
        );
        assert_eq!(None, NmtCommandSpecifier::for_state(NmtState::Bootup));
    }
}
