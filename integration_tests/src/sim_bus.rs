//! A single threaded simulated bus
//!
//! Frames sent by the client are delivered to every node synchronously, and the nodes' responses
//! are queued for the client's receiver before `send` returns. All frames are kept in a traffic
//! log for inspection.
use std::{
    cell::{RefCell, RefMut},
    collections::VecDeque,
    rc::Rc,
    time::Duration,
};

use yacc_client::{CanConnection, ConnectError, SessionConfig, Transport};
use yacc_common::{
    messages::{CanMessage, NmtCommand, NmtCommandSpecifier, SDO_REQ_BASE},
    sdo::SdoRequest,
    traits::{CanReceiver, CanSendError, CanSender},
};

use crate::sim_node::SimNode;

#[derive(Debug, Default)]
struct BusState {
    nodes: Vec<SimNode>,
    client_queue: VecDeque<CanMessage>,
    traffic: Vec<CanMessage>,
}

#[derive(Debug, Clone)]
pub struct SimBus {
    state: Rc<RefCell<BusState>>,
}

impl SimBus {
    pub fn new(nodes: Vec<SimNode>) -> Self {
        let state = BusState {
            nodes,
            ..Default::default()
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Get the client's end of the bus
    ///
    /// There is one client queue; all receivers share it.
    pub fn new_pair(&self) -> (SimBusSender, SimBusReceiver) {
        (
            SimBusSender {
                state: self.state.clone(),
            },
            SimBusReceiver {
                state: self.state.clone(),
            },
        )
    }

    /// Accessor to allow tests to access nodes while they are owned by the bus
    ///
    /// Panics if there is no node with the ID.
    pub fn node(&self, node_id: u8) -> RefMut<'_, SimNode> {
        RefMut::map(self.state.borrow_mut(), |state| {
            state
                .nodes
                .iter_mut()
                .find(|n| n.node_id() == node_id)
                .expect("no node with this ID on the bus")
        })
    }

    pub fn traffic(&self) -> Vec<CanMessage> {
        self.state.borrow().traffic.clone()
    }

    /// Queue a frame for the client as if a node had sent it earlier
    pub fn inject(&self, msg: CanMessage) {
        let mut state = self.state.borrow_mut();
        state.traffic.push(msg);
        state.client_queue.push_back(msg);
    }

    pub fn clear_traffic(&self) {
        self.state.borrow_mut().traffic.clear();
    }

    /// The requests the client sent, decoded
    pub fn requests(&self) -> Vec<Request> {
        self.state
            .borrow()
            .traffic
            .iter()
            .filter_map(|msg| Request::decode(*msg))
            .collect()
    }
}

/// A decoded client request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Nmt(NmtCommandSpecifier, u8),
    Upload(u16, u8),
    Download(u16, u8, Vec<u8>),
    Abort(u16, u8),
}

impl Request {
    fn decode(msg: CanMessage) -> Option<Self> {
        if let Ok(cmd) = NmtCommand::try_from(msg) {
            return Some(Request::Nmt(cmd.cs, cmd.node));
        }
        let raw_id = msg.id().raw();
        if !(SDO_REQ_BASE as u32 + 1..SDO_REQ_BASE as u32 + 0x80).contains(&raw_id) {
            return None;
        }
        match SdoRequest::try_from(msg.data()).ok()? {
            SdoRequest::InitiateUpload { index, sub } => Some(Request::Upload(index, sub)),
            SdoRequest::InitiateDownload {
                n,
                s,
                index,
                sub,
                data,
                ..
            } => {
                let len = if s { 4 - n as usize } else { 4 };
                Some(Request::Download(index, sub, data[..len].to_vec()))
            }
            SdoRequest::Abort { index, sub, .. } => Some(Request::Abort(index, sub)),
        }
    }
}

#[derive(Debug)]
pub struct SimBusSender {
    state: Rc<RefCell<BusState>>,
}

impl CanSender for SimBusSender {
    fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError> {
        let mut state = self.state.borrow_mut();
        state.traffic.push(msg);
        let responses: Vec<CanMessage> = state
            .nodes
            .iter_mut()
            .flat_map(|node| node.handle_message(msg))
            .collect();
        for response in responses {
            state.traffic.push(response);
            state.client_queue.push_back(response);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct SimBusReceiver {
    state: Rc<RefCell<BusState>>,
}

impl CanReceiver for SimBusReceiver {
    type Error = ();

    fn try_recv(&mut self) -> Option<CanMessage> {
        self.state.borrow_mut().client_queue.pop_front()
    }

    /// Nothing is ever sent while the client waits, so an empty queue times out at once
    fn recv(&mut self, _timeout: Duration) -> Result<CanMessage, ()> {
        self.try_recv().ok_or(())
    }
}

/// A [Transport] which connects to a [SimBus]
#[derive(Debug, Clone)]
pub struct SimTransport {
    pub bus: SimBus,
}

impl Transport for SimTransport {
    type Connection = CanConnection<SimBusSender, SimBusReceiver>;

    fn connect(&self, config: &SessionConfig) -> Result<Self::Connection, ConnectError> {
        let (sender, receiver) = self.bus.new_pair();
        Ok(CanConnection::new(
            config.node.id,
            config.timeouts,
            sender,
            receiver,
        ))
    }
}
