//! The seam between the configuration engine and the bus
//!
//! The engine only needs three primitives from a connected node: expedited SDO upload and
//! download, an NMT state command, and a way to observe the node's heartbeat. [Connection]
//! captures those, and [Transport] opens one from a [SessionConfig].
use std::time::Duration;

use snafu::Snafu;
use yacc_common::{sdo::abort_description, NmtState};

use crate::config::{InterfaceKind, SessionConfig};

/// Error returned by an SDO or NMT transfer
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransferError {
    /// The node did not answer before the SDO timeout
    #[snafu(display("No response from node"))]
    NoResponse,
    /// The response could not be parsed
    #[snafu(display("Malformed SDO response"))]
    MalformedResponse,
    /// The response was valid but not an answer to the request
    #[snafu(display("Unexpected SDO response"))]
    UnexpectedResponse,
    /// The node aborted the transfer
    #[snafu(display(
        "Node aborted transfer of 0x{index:04X} 0x{sub:02X} with 0x{abort_code:08X}: {}",
        abort_description(*abort_code)
    ))]
    ServerAbort {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
        /// The CiA 301 abort code
        abort_code: u32,
    },
    /// The value does not fit an expedited transfer
    #[snafu(display("A {len} byte value requires a segmented transfer, which is not supported"))]
    Unsupported {
        /// Value length in bytes
        len: usize,
    },
    /// The request could not be put on the bus
    #[snafu(display("Failed to send CAN message"))]
    SendFailed,
    /// The state cannot be requested by an NMT command
    #[snafu(display("Cannot command a node into {state}"))]
    InvalidNmtState {
        /// The requested state
        state: NmtState,
    },
}

/// Error returned when the node's heartbeat does not confirm an NMT transition
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LivenessError {
    /// No heartbeat arrived in time
    #[snafu(display("No heartbeat from node within {timeout:?}"))]
    NoHeartbeat {
        /// How long was waited
        timeout: Duration,
    },
    /// A heartbeat arrived, but reported the wrong state
    #[snafu(display("Node reported {actual}, expected {expected}"))]
    UnexpectedState {
        /// The state that was requested
        expected: NmtState,
        /// The state the node reported
        actual: NmtState,
    },
}

/// Error returned when the bus cannot be opened
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConnectError {
    /// The channel could not be opened
    #[snafu(display("Failed to open {interface} channel '{channel}': {source}"))]
    Open {
        /// Adapter kind
        interface: InterfaceKind,
        /// Channel name
        channel: String,
        /// The cause
        source: std::io::Error,
    },
    /// No driver for this interface kind is compiled in
    #[snafu(display("No driver for {interface} interfaces in this build"))]
    Unavailable {
        /// Adapter kind
        interface: InterfaceKind,
    },
}

/// The primitives the configuration engine needs from a connected node
///
/// Calls are blocking and must not overlap; a connection handles one request at a time.
pub trait Connection {
    /// Read an object from the node
    fn sdo_upload(&mut self, index: u16, sub: u8) -> Result<Vec<u8>, TransferError>;

    /// Write an object on the node
    fn sdo_download(&mut self, index: u16, sub: u8, data: &[u8]) -> Result<(), TransferError>;

    /// Command the node into `state`
    fn set_nmt_state(&mut self, state: NmtState) -> Result<(), TransferError>;

    /// Block until the node's next heartbeat, and return the state it reports
    fn await_heartbeat(&mut self) -> Result<NmtState, LivenessError>;
}

impl<C: Connection + ?Sized> Connection for &mut C {
    fn sdo_upload(&mut self, index: u16, sub: u8) -> Result<Vec<u8>, TransferError> {
        (**self).sdo_upload(index, sub)
    }

    fn sdo_download(&mut self, index: u16, sub: u8, data: &[u8]) -> Result<(), TransferError> {
        (**self).sdo_download(index, sub, data)
    }

    fn set_nmt_state(&mut self, state: NmtState) -> Result<(), TransferError> {
        (**self).set_nmt_state(state)
    }

    fn await_heartbeat(&mut self) -> Result<NmtState, LivenessError> {
        (**self).await_heartbeat()
    }
}

/// Opens [Connection]s
pub trait Transport {
    /// The connection type produced
    type Connection: Connection;

    /// Open the bus described by `config` and address the configured node
    fn connect(&self, config: &SessionConfig) -> Result<Self::Connection, ConnectError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertables::*;

    #[test]
    fn test_abort_display_includes_description() {
        let err = TransferError::ServerAbort {
            index: 0x2100,
            sub: 1,
            abort_code: 0x0601_0002,
        };
        let text = err.to_string();
        assert_contains!(text, "0x2100 0x01");
        assert_contains!(text, "0x06010002");
        assert_contains!(text, "read only");
    }
}
