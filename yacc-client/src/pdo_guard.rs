//! Protection for writes to PDO configuration objects
//!
//! Changing the communication or mapping parameters of a PDO while it is live can put garbage on
//! the bus, and many devices reject such writes outright. A [PdoGuard] wraps a single write: it
//! moves the node to pre-operational, invalidates the PDO and clears its mapping, performs the
//! write, then puts the mapping count and the COB-ID back.
//!
//! Writes to any other object pass straight through.
use snafu::{ResultExt, Snafu};
use yacc_common::{
    constants::{
        object_ids::{RPDO_COMM_BASE, RPDO_MAPPING_BASE, TPDO_COMM_BASE, TPDO_MAPPING_BASE},
        values::{PDO_COB_ID_SUB, PDO_MAPPING_COUNT_SUB},
    },
    NmtState,
};

use crate::connection::{Connection, LivenessError, TransferError};

/// Error returned by a guarded write
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GuardError {
    /// An SDO transfer failed, either the write itself or one of the guard's own accesses
    #[snafu(display("Transfer of 0x{index:04X} 0x{sub:02X} failed: {source}"))]
    Transfer {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
        /// The cause
        source: TransferError,
    },
    /// The pre-operational command could not be sent
    #[snafu(display("NMT command failed: {source}"))]
    Nmt {
        /// The cause
        source: TransferError,
    },
    /// The node did not confirm pre-operational
    #[snafu(display("Node did not enter pre-operational: {source}"))]
    Liveness {
        /// The cause
        source: LivenessError,
    },
    /// The COB-ID read back is not a 32-bit value
    #[snafu(display("COB-ID at 0x{index:04X} is {len} bytes, expected 4"))]
    CobIdLength {
        /// Communication parameter index
        index: u16,
        /// Bytes read
        len: usize,
    },
}

impl GuardError {
    /// The object whose transfer failed, if the failure was an SDO transfer
    pub fn object(&self) -> Option<(u16, u8)> {
        match self {
            GuardError::Transfer { index, sub, .. } => Some((*index, *sub)),
            _ => None,
        }
    }
}

type Result<T> = std::result::Result<T, GuardError>;

/// Whether a PDO is received or transmitted by the node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PdoDirection {
    /// RPDO
    Receive,
    /// TPDO
    Transmit,
}

/// Which of the two objects describing a PDO an index belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PdoParameter {
    /// COB-ID, transmission type, timers
    Communication,
    /// The list of mapped objects
    Mapping,
}

/// The PDO configuration object an index belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PdoBlock {
    /// RPDO or TPDO
    pub direction: PdoDirection,
    /// Communication or mapping parameter
    pub parameter: PdoParameter,
    /// Offset of the PDO within its range, 0 for the first PDO
    pub offset: u8,
}

impl PdoBlock {
    /// Classify an object index
    ///
    /// Returns None for objects outside the four PDO parameter ranges.
    pub fn classify(index: u16) -> Option<PdoBlock> {
        let (direction, parameter) = match index & 0xFF00 {
            RPDO_COMM_BASE => (PdoDirection::Receive, PdoParameter::Communication),
            RPDO_MAPPING_BASE => (PdoDirection::Receive, PdoParameter::Mapping),
            TPDO_COMM_BASE => (PdoDirection::Transmit, PdoParameter::Communication),
            TPDO_MAPPING_BASE => (PdoDirection::Transmit, PdoParameter::Mapping),
            _ => return None,
        };
        Some(PdoBlock {
            direction,
            parameter,
            offset: (index & 0xFF) as u8,
        })
    }

    /// Index of the communication parameter object of this PDO
    pub fn communication_index(&self) -> u16 {
        let base = match self.direction {
            PdoDirection::Receive => RPDO_COMM_BASE,
            PdoDirection::Transmit => TPDO_COMM_BASE,
        };
        base + self.offset as u16
    }

    /// Index of the mapping parameter object of this PDO
    pub fn mapping_index(&self) -> u16 {
        let base = match self.direction {
            PdoDirection::Receive => RPDO_MAPPING_BASE,
            PdoDirection::Transmit => TPDO_MAPPING_BASE,
        };
        base + self.offset as u16
    }
}

/// What a guard changed before the write
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PdoState {
    /// The PDO was valid, and was invalidated
    pub was_enabled: bool,
    /// The mapping count was nonzero, and was cleared
    pub had_mapping: bool,
}

/// Values saved while suspended, written back when restoring
#[derive(Debug, Default)]
struct Suspension {
    state: PdoState,
    cob_id: Vec<u8>,
    mapping_count: Vec<u8>,
    restore_cob_id: bool,
    restore_mapping: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GuardState {
    Idle,
    Suspended,
    Applying,
    Restoring,
    Done,
}

/// A single-use wrapper around one SDO write
#[derive(Debug)]
pub struct PdoGuard<'c, C: ?Sized> {
    connection: &'c mut C,
    index: u16,
    block: Option<PdoBlock>,
    state: GuardState,
}

/// Bit 31 of the COB-ID lives in the last byte on the wire; set means the PDO is invalid
const COB_ID_INVALID_BIT: u8 = 0x80;

fn cob_id_is_valid(raw: &[u8]) -> bool {
    raw[3] & COB_ID_INVALID_BIT == 0
}

impl<'c, C: Connection + ?Sized> PdoGuard<'c, C> {
    /// Create a guard for a write to `index`
    pub fn new(connection: &'c mut C, index: u16) -> Self {
        Self {
            connection,
            index,
            block: PdoBlock::classify(index),
            state: GuardState::Idle,
        }
    }

    /// The PDO the guarded index belongs to, if any
    pub fn block(&self) -> Option<PdoBlock> {
        self.block
    }

    /// Perform the write
    ///
    /// Once the PDO has been suspended, restoration is attempted whether or not the write
    /// succeeds. A failure while suspending is returned at once, leaving the node in
    /// pre-operational with whatever was already changed.
    pub fn write(mut self, sub: u8, data: &[u8]) -> Result<PdoState> {
        let index = self.index;
        let Some(block) = self.block else {
            self.state = GuardState::Done;
            return self
                .connection
                .sdo_download(index, sub, data)
                .context(TransferSnafu { index, sub })
                .map(|()| PdoState::default());
        };

        let suspension = self.suspend(block, sub)?;
        self.state = GuardState::Applying;
        let applied = self
            .connection
            .sdo_download(index, sub, data)
            .context(TransferSnafu { index, sub });

        self.state = GuardState::Restoring;
        let restored = self.restore(block, &suspension);
        self.state = GuardState::Done;

        match (applied, restored) {
            (Ok(()), Ok(())) => Ok(suspension.state),
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(e)) => Err(e),
            (Err(e), Err(restore_err)) => {
                log::warn!(
                    "Restoring PDO 0x{:04X} after a failed write also failed: {}",
                    block.communication_index(),
                    restore_err
                );
                Err(e)
            }
        }
    }

    fn suspend(&mut self, block: PdoBlock, sub: u8) -> Result<Suspension> {
        debug_assert_eq!(GuardState::Idle, self.state);
        self.state = GuardState::Suspended;

        self.connection
            .set_nmt_state(NmtState::PreOperational)
            .context(NmtSnafu)?;
        let state = self.connection.await_heartbeat().context(LivenessSnafu)?;
        if state != NmtState::PreOperational {
            return Err(GuardError::Liveness {
                source: LivenessError::UnexpectedState {
                    expected: NmtState::PreOperational,
                    actual: state,
                },
            });
        }

        let mut suspension = Suspension::default();

        let comm_index = block.communication_index();
        let cob_id = self.upload(comm_index, PDO_COB_ID_SUB)?;
        if cob_id.len() != 4 {
            return CobIdLengthSnafu {
                index: comm_index,
                len: cob_id.len(),
            }
            .fail();
        }
        if cob_id_is_valid(&cob_id) {
            let mut invalid = cob_id.clone();
            invalid[3] |= COB_ID_INVALID_BIT;
            self.download(comm_index, PDO_COB_ID_SUB, &invalid)?;
            suspension.state.was_enabled = true;
            // A write to the COB-ID itself decides the final state
            suspension.restore_cob_id =
                !(block.parameter == PdoParameter::Communication && sub == PDO_COB_ID_SUB);
            suspension.cob_id = cob_id;
        }

        if block.parameter == PdoParameter::Mapping {
            let mapping_index = block.mapping_index();
            let count = self.upload(mapping_index, PDO_MAPPING_COUNT_SUB)?;
            if count.iter().any(|&b| b != 0) {
                self.download(
                    mapping_index,
                    PDO_MAPPING_COUNT_SUB,
                    &vec![0; count.len()],
                )?;
                suspension.state.had_mapping = true;
                // Likewise, a write to the count itself is the count to keep
                suspension.restore_mapping = sub != PDO_MAPPING_COUNT_SUB;
                suspension.mapping_count = count;
            }
        }

        log::info!(
            "Suspended PDO 0x{:04X} for write to 0x{:04X} 0x{:02X} ({:?})",
            comm_index,
            self.index,
            sub,
            suspension.state
        );
        Ok(suspension)
    }

    /// Put the mapping count back, then re-validate the PDO
    fn restore(&mut self, block: PdoBlock, suspension: &Suspension) -> Result<()> {
        if suspension.restore_mapping {
            self.download(
                block.mapping_index(),
                PDO_MAPPING_COUNT_SUB,
                &suspension.mapping_count,
            )?;
        }
        if suspension.restore_cob_id {
            self.download(
                block.communication_index(),
                PDO_COB_ID_SUB,
                &suspension.cob_id,
            )?;
        }
        Ok(())
    }

    fn upload(&mut self, index: u16, sub: u8) -> Result<Vec<u8>> {
        self.connection
            .sdo_upload(index, sub)
            .context(TransferSnafu { index, sub })
    }

    fn download(&mut self, index: u16, sub: u8, data: &[u8]) -> Result<()> {
        self.connection
            .sdo_download(index, sub, data)
            .context(TransferSnafu { index, sub })
    }
}
