//! Test utils
//!
//! Only available with `#[cfg(test)]`
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use yacc_common::{sdo::AbortCode, NmtState};

use crate::connection::{Connection, LivenessError, TransferError};

/// One request seen by a [MockConnection]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Upload(u16, u8),
    Download(u16, u8, Vec<u8>),
    Nmt(NmtState),
    Heartbeat,
}

/// An in-memory [Connection] which records every request
#[derive(Debug)]
pub struct MockConnection {
    pub registers: HashMap<(u16, u8), Vec<u8>>,
    pub events: Vec<Event>,
    pub state: NmtState,
    /// Downloads to these objects are aborted
    pub fail_downloads: HashSet<(u16, u8)>,
    /// Uploads of these objects are aborted
    pub fail_uploads: HashSet<(u16, u8)>,
    /// NMT commands are accepted but have no effect
    pub ignore_nmt: bool,
    /// No heartbeats are produced
    pub silent: bool,
}

impl Default for MockConnection {
    fn default() -> Self {
        Self {
            registers: HashMap::new(),
            events: Vec::new(),
            state: NmtState::Operational,
            fail_downloads: HashSet::new(),
            fail_uploads: HashSet::new(),
            ignore_nmt: false,
            silent: false,
        }
    }
}

impl MockConnection {
    pub fn with_register(mut self, index: u16, sub: u8, value: &[u8]) -> Self {
        self.registers.insert((index, sub), value.to_vec());
        self
    }

    pub fn register(&self, index: u16, sub: u8) -> Option<&[u8]> {
        self.registers.get(&(index, sub)).map(|v| v.as_slice())
    }

    /// Only the downloads, in order
    pub fn downloads(&self) -> Vec<(u16, u8, Vec<u8>)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Download(index, sub, data) => Some((*index, *sub, data.clone())),
                _ => None,
            })
            .collect()
    }
}

impl Connection for MockConnection {
    fn sdo_upload(&mut self, index: u16, sub: u8) -> Result<Vec<u8>, TransferError> {
        self.events.push(Event::Upload(index, sub));
        if self.fail_uploads.contains(&(index, sub)) {
            return Err(TransferError::ServerAbort {
                index,
                sub,
                abort_code: AbortCode::NoSuchObject as u32,
            });
        }
        self.registers
            .get(&(index, sub))
            .cloned()
            .ok_or(TransferError::ServerAbort {
                index,
                sub,
                abort_code: AbortCode::NoSuchObject as u32,
            })
    }

    fn sdo_download(&mut self, index: u16, sub: u8, data: &[u8]) -> Result<(), TransferError> {
        self.events.push(Event::Download(index, sub, data.to_vec()));
        if self.fail_downloads.contains(&(index, sub)) {
            return Err(TransferError::ServerAbort {
                index,
                sub,
                abort_code: AbortCode::ReadOnly as u32,
            });
        }
        self.registers.insert((index, sub), data.to_vec());
        Ok(())
    }

    fn set_nmt_state(&mut self, state: NmtState) -> Result<(), TransferError> {
        self.events.push(Event::Nmt(state));
        if !self.ignore_nmt {
            self.state = state;
        }
        Ok(())
    }

    fn await_heartbeat(&mut self) -> Result<NmtState, LivenessError> {
        self.events.push(Event::Heartbeat);
        if self.silent {
            Err(LivenessError::NoHeartbeat {
                timeout: Duration::from_millis(3000),
            })
        } else {
            Ok(self.state)
        }
    }
}
