//! A simulated configurable node
//!
//! The node answers expedited SDO requests from a register map, follows NMT commands, and emits a
//! heartbeat after each one. PDO configuration follows the CiA 301 rules closely enough that an
//! unguarded write to a live PDO is aborted.
use std::collections::BTreeMap;

use yacc_common::{
    constants::{
        object_ids::{RESTORE_DEFAULTS, SAVE_OBJECTS},
        values::{ALL_PARAMETERS_SUB, RESTORE_SIGNATURE, SAVE_SIGNATURE},
    },
    messages::{
        CanId, CanMessage, Heartbeat, NmtCommand, NmtCommandSpecifier, NmtState, NMT_CMD_ID,
        SDO_REQ_BASE, SDO_RESP_BASE,
    },
    sdo::{AbortCode, SdoRequest, SdoResponse},
};

#[derive(Debug)]
pub struct SimNode {
    node_id: u8,
    state: NmtState,
    registers: BTreeMap<(u16, u8), Vec<u8>>,
    writes: Vec<(u16, u8, Vec<u8>)>,
    save_count: usize,
    restore_count: usize,
    /// NMT commands are acknowledged, but the state does not change
    frozen: bool,
    /// No heartbeats are sent
    silent: bool,
}

impl SimNode {
    pub fn new(node_id: u8) -> Self {
        Self {
            node_id,
            state: NmtState::Operational,
            registers: BTreeMap::new(),
            writes: Vec::new(),
            save_count: 0,
            restore_count: 0,
            frozen: false,
            silent: false,
        }
    }

    /// A node with a typical drive layout: one live TPDO mapping two objects
    pub fn drive(node_id: u8) -> Self {
        let cob_id = 0x180 + node_id as u32;
        Self::new(node_id)
            .with_register(0x1000, 0, &0x0000_0191u32.to_le_bytes())
            .with_register(SAVE_OBJECTS, ALL_PARAMETERS_SUB, &1u32.to_le_bytes())
            .with_register(RESTORE_DEFAULTS, ALL_PARAMETERS_SUB, &1u32.to_le_bytes())
            .with_register(0x1017, 0, &0u16.to_le_bytes())
            .with_register(0x1800, 0, &[2])
            .with_register(0x1800, 1, &cob_id.to_le_bytes())
            .with_register(0x1800, 2, &[1])
            .with_register(0x1A00, 0, &[2])
            .with_register(0x1A00, 1, &0x2000_0010u32.to_le_bytes())
            .with_register(0x1A00, 2, &0x2001_0008u32.to_le_bytes())
            .with_register(0x2100, 0, &1000u16.to_le_bytes())
            .with_register(0x2200, 0, &(-5i16).to_le_bytes())
            .with_register(0x2300, 0, &[0])
    }

    pub fn with_register(mut self, index: u16, sub: u8, value: &[u8]) -> Self {
        self.registers.insert((index, sub), value.to_vec());
        self
    }

    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn state(&self) -> NmtState {
        self.state
    }

    pub fn register(&self, index: u16, sub: u8) -> Option<&[u8]> {
        self.registers.get(&(index, sub)).map(|v| v.as_slice())
    }

    /// Every accepted SDO write, in order
    pub fn writes(&self) -> &[(u16, u8, Vec<u8>)] {
        &self.writes
    }

    pub fn save_count(&self) -> usize {
        self.save_count
    }

    pub fn restore_count(&self) -> usize {
        self.restore_count
    }

    /// Handle one frame from the bus, returning the frames sent in response
    pub fn handle_message(&mut self, msg: CanMessage) -> Vec<CanMessage> {
        if msg.id() == NMT_CMD_ID {
            return match NmtCommand::try_from(msg) {
                Ok(cmd) if cmd.node == 0 || cmd.node == self.node_id => self.handle_nmt(cmd.cs),
                _ => Vec::new(),
            };
        }

        if msg.id() == CanId::std(SDO_REQ_BASE + self.node_id as u16) {
            let response = match SdoRequest::try_from(msg.data()) {
                Ok(request) => self.handle_sdo(request),
                Err(abort_code) => Some(SdoResponse::abort(0, 0, abort_code)),
            };
            let resp_id = CanId::std(SDO_RESP_BASE + self.node_id as u16);
            return response
                .map(|r| r.to_can_message(resp_id))
                .into_iter()
                .collect();
        }

        Vec::new()
    }

    fn handle_nmt(&mut self, cs: NmtCommandSpecifier) -> Vec<CanMessage> {
        if !self.frozen {
            self.state = match cs {
                NmtCommandSpecifier::Start => NmtState::Operational,
                NmtCommandSpecifier::Stop => NmtState::Stopped,
                NmtCommandSpecifier::EnterPreOp
                | NmtCommandSpecifier::ResetApp
                | NmtCommandSpecifier::ResetComm => NmtState::PreOperational,
            };
        }
        if self.silent {
            return Vec::new();
        }
        let heartbeat = Heartbeat {
            node: self.node_id,
            toggle: false,
            state: self.state,
        };
        vec![heartbeat.into()]
    }

    fn handle_sdo(&mut self, request: SdoRequest) -> Option<SdoResponse> {
        match request {
            SdoRequest::InitiateUpload { index, sub } => {
                let response = match self.registers.get(&(index, sub)) {
                    Some(value) => SdoResponse::expedited_upload(index, sub, value)
                        .unwrap_or(SdoResponse::abort(index, sub, AbortCode::UnsupportedAccess)),
                    None => SdoResponse::abort(index, sub, AbortCode::NoSuchObject),
                };
                Some(response)
            }
            SdoRequest::InitiateDownload {
                n,
                e,
                s,
                index,
                sub,
                data,
            } => {
                if !e {
                    return Some(SdoResponse::abort(
                        index,
                        sub,
                        AbortCode::InvalidCommandSpecifier,
                    ));
                }
                let len = if s { 4 - n as usize } else { 4 };
                let response = match self.write(index, sub, &data[..len]) {
                    Ok(()) => SdoResponse::download_acknowledge(index, sub),
                    Err(abort_code) => SdoResponse::abort(index, sub, abort_code),
                };
                Some(response)
            }
            SdoRequest::Abort { .. } => None,
        }
    }

    fn write(&mut self, index: u16, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        if !self.registers.contains_key(&(index, sub)) {
            return Err(AbortCode::NoSuchObject);
        }
        self.check_pdo_write(index, sub)?;

        match (index, sub) {
            (SAVE_OBJECTS, ALL_PARAMETERS_SUB) => {
                if data != SAVE_SIGNATURE {
                    return Err(AbortCode::InvalidValue);
                }
                self.save_count += 1;
            }
            (RESTORE_DEFAULTS, ALL_PARAMETERS_SUB) => {
                if data != RESTORE_SIGNATURE {
                    return Err(AbortCode::InvalidValue);
                }
                self.restore_count += 1;
            }
            _ => {
                self.registers.insert((index, sub), data.to_vec());
            }
        }
        self.writes.push((index, sub, data.to_vec()));
        Ok(())
    }

    /// PDO parameters may only change outside operational, and a mapping only while the PDO is
    /// invalid and its count is zero
    fn check_pdo_write(&self, index: u16, sub: u8) -> Result<(), AbortCode> {
        let kind = index & 0xFF00;
        if !matches!(kind, 0x1400 | 0x1600 | 0x1800 | 0x1A00) {
            return Ok(());
        }
        if self.state == NmtState::Operational {
            return Err(AbortCode::CantStoreDeviceState);
        }
        if (kind == 0x1600 || kind == 0x1A00) && sub != 0 {
            let mapped = self
                .register(index, 0)
                .is_some_and(|count| count.iter().any(|b| *b != 0));
            if mapped || self.pdo_valid(index - 0x200) {
                return Err(AbortCode::UnallowedPdo);
            }
        }
        Ok(())
    }

    fn pdo_valid(&self, comm_index: u16) -> bool {
        self.register(comm_index, 1)
            .is_some_and(|cob_id| cob_id.len() == 4 && cob_id[3] & 0x80 == 0)
    }
}
