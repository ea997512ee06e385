use yacc_common::{
    traits::{CanReceiver, CanSender},
    NmtState, NodeId,
};

use crate::{
    config::Timeouts,
    connection::{Connection, LivenessError, TransferError},
    nmt_client::NmtClient,
    sdo_client::SdoClient,
};

/// A [Connection] to one node over any CAN sender/receiver pair
///
/// SDO and NMT traffic share the pair, one request at a time.
#[derive(Debug)]
pub struct CanConnection<S, R> {
    node_id: NodeId,
    timeouts: Timeouts,
    sender: S,
    receiver: R,
}

impl<S: CanSender, R: CanReceiver> CanConnection<S, R> {
    /// Create a connection addressing `node_id`
    pub fn new(node_id: NodeId, timeouts: Timeouts, sender: S, receiver: R) -> Self {
        Self {
            node_id,
            timeouts,
            sender,
            receiver,
        }
    }

    /// The addressed node
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn sdo(&mut self) -> SdoClient<&mut S, &mut R> {
        SdoClient::new_std(self.node_id, &mut self.sender, &mut self.receiver)
            .with_timeout(self.timeouts.sdo())
    }

    fn nmt(&mut self) -> NmtClient<&mut S, &mut R> {
        NmtClient::new(self.node_id, &mut self.sender, &mut self.receiver)
            .with_heartbeat_timeout(self.timeouts.heartbeat())
    }
}

impl<S: CanSender, R: CanReceiver> Connection for CanConnection<S, R> {
    fn sdo_upload(&mut self, index: u16, sub: u8) -> Result<Vec<u8>, TransferError> {
        self.sdo().upload(index, sub)
    }

    fn sdo_download(&mut self, index: u16, sub: u8, data: &[u8]) -> Result<(), TransferError> {
        self.sdo().download(index, sub, data)
    }

    fn set_nmt_state(&mut self, state: NmtState) -> Result<(), TransferError> {
        self.nmt().set_state(state)
    }

    fn await_heartbeat(&mut self) -> Result<NmtState, LivenessError> {
        self.nmt().wait_for_heartbeat()
    }
}
