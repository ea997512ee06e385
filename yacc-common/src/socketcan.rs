use std::{sync::Arc, time::Duration};

use crate::{
    messages::{CanId, CanMessage},
    traits::{CanReceiver, CanSendError, CanSender},
};
use snafu::{ResultExt, Snafu};

use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Socket, StandardId};

// Polling interval used by try_recv; a zero socket timeout would block
const POLL_INTERVAL: Duration = Duration::from_millis(1);

fn socketcan_id_to_yacc_id(id: socketcan::Id) -> CanId {
    match id {
        socketcan::Id::Standard(id) => CanId::std(id.as_raw()),
        socketcan::Id::Extended(id) => CanId::extended(id.as_raw()),
    }
}

fn yacc_id_to_socketcan_id(id: CanId) -> Option<socketcan::Id> {
    match id {
        CanId::Extended(id) => ExtendedId::new(id).map(Into::into),
        CanId::Std(id) => StandardId::new(id).map(Into::into),
    }
}

fn socketcan_frame_to_yacc_message(frame: CanFrame) -> Option<CanMessage> {
    match frame {
        CanFrame::Data(frame) => Some(CanMessage::new(
            socketcan_id_to_yacc_id(frame.id()),
            frame.data(),
        )),
        CanFrame::Remote(_) => None,
        CanFrame::Error(frame) => {
            log::debug!("Ignoring CAN error frame {frame:?}");
            None
        }
    }
}

fn yacc_message_to_socket_frame(msg: &CanMessage) -> Option<CanFrame> {
    CanFrame::new(yacc_id_to_socketcan_id(msg.id())?, msg.data())
}

/// Error returned by [SocketCanReceiver]
#[derive(Debug, Snafu)]
pub enum ReceiveError {
    /// The socket failed, or no frame arrived before the timeout
    #[snafu(display("socketcan receive failed: {source}"))]
    Io {
        /// The underlying socket error
        source: std::io::Error,
    },
}

/// Receiving half of a socketcan device
#[derive(Debug, Clone)]
pub struct SocketCanReceiver {
    socket: Arc<CanSocket>,
}

impl CanReceiver for SocketCanReceiver {
    type Error = ReceiveError;

    fn try_recv(&mut self) -> Option<CanMessage> {
        match self.socket.read_frame_timeout(POLL_INTERVAL) {
            Ok(frame) => socketcan_frame_to_yacc_message(frame),
            Err(_) => None,
        }
    }

    fn recv(&mut self, timeout: Duration) -> Result<CanMessage, ReceiveError> {
        loop {
            let frame = self.socket.read_frame_timeout(timeout).context(IoSnafu)?;
            if let Some(msg) = socketcan_frame_to_yacc_message(frame) {
                return Ok(msg);
            }
        }
    }
}

/// Sending half of a socketcan device
#[derive(Debug, Clone)]
pub struct SocketCanSender {
    socket: Arc<CanSocket>,
}

impl CanSender for SocketCanSender {
    fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError> {
        let frame = yacc_message_to_socket_frame(&msg).ok_or(CanSendError(msg))?;
        self.socket
            .write_frame(&frame)
            .map_err(|_| CanSendError(msg))
    }
}

/// Open a socketcan device and split it into a sender and receiver
///
/// # Arguments
/// * `device` - The name of the socketcan device to open, e.g. "vcan0", or "can0"
///
/// Both halves share one socket, so the receiver does not see frames sent by the sender.
pub fn open_socketcan<S: AsRef<str>>(
    device: S,
) -> Result<(SocketCanSender, SocketCanReceiver), std::io::Error> {
    let socket = CanSocket::open(device.as_ref())?;
    let socket = Arc::new(socket);
    let receiver = SocketCanReceiver {
        socket: socket.clone(),
    };
    let sender = SocketCanSender { socket };
    Ok((sender, receiver))
}
