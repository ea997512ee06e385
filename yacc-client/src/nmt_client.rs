//! nmt_client module for sending NMT commands to a specific node
use std::time::{Duration, Instant};

use yacc_common::{
    messages::{Heartbeat, NmtCommand, NmtCommandSpecifier},
    traits::{CanReceiver, CanSender},
    NmtState, NodeId,
};

use crate::connection::{
    InvalidNmtStateSnafu, LivenessError, NoHeartbeatSnafu, SendFailedSnafu, TransferError,
};

const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Client for the NMT commands and heartbeat of a specific node
#[derive(Debug)]
pub struct NmtClient<S, R> {
    node_id: NodeId,
    heartbeat_timeout: Duration,
    sender: S,
    receiver: R,
}

impl<S: CanSender, R: CanReceiver> NmtClient<S, R> {
    /// Create a new NmtClient
    pub fn new(node_id: NodeId, sender: S, receiver: R) -> Self {
        Self {
            node_id,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            sender,
            receiver,
        }
    }

    /// Set how long [wait_for_heartbeat](Self::wait_for_heartbeat) waits
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Command the node into `state`
    ///
    /// Heartbeats already queued are dropped first, so the next heartbeat seen was sent after the
    /// command.
    pub fn set_state(&mut self, state: NmtState) -> Result<(), TransferError> {
        let cmd = NmtCommandSpecifier::for_state(state)
            .ok_or_else(|| InvalidNmtStateSnafu { state }.build())?;
        self.receiver.flush();
        log::info!("Node {}: NMT {:?}", self.node_id, cmd);
        self.send_nmt_cmd(cmd)
    }

    /// Block until the node's next heartbeat, and return the state it reports
    pub fn wait_for_heartbeat(&mut self) -> Result<NmtState, LivenessError> {
        let timeout = self.heartbeat_timeout;
        let wait_until = Instant::now() + timeout;
        loop {
            let remaining = wait_until.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return NoHeartbeatSnafu { timeout }.fail();
            }
            let Ok(msg) = self.receiver.recv(remaining) else {
                return NoHeartbeatSnafu { timeout }.fail();
            };
            // Traffic from other nodes, and anything that is not a heartbeat, is ignored
            if let Ok(heartbeat) = Heartbeat::try_from(msg) {
                if heartbeat.node == self.node_id.raw() {
                    log::debug!("Node {}: heartbeat {}", self.node_id, heartbeat.state);
                    return Ok(heartbeat.state);
                }
            }
        }
    }

    fn send_nmt_cmd(&mut self, cs: NmtCommandSpecifier) -> Result<(), TransferError> {
        let message = NmtCommand {
            cs,
            node: self.node_id.raw(),
        };
        self.sender
            .send(message.into())
            .map_err(|_| SendFailedSnafu.build())
    }
}
