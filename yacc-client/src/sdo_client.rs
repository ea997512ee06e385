use std::time::{Duration, Instant};

use yacc_common::{
    messages::{CanId, SDO_REQ_BASE, SDO_RESP_BASE},
    sdo::{AbortCode, SdoRequest, SdoResponse},
    traits::{CanReceiver, CanSender},
    NodeId,
};

use crate::connection::{
    MalformedResponseSnafu, NoResponseSnafu, SendFailedSnafu, ServerAbortSnafu, TransferError,
    UnexpectedResponseSnafu, UnsupportedSnafu,
};

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);

type Result<T> = std::result::Result<T, TransferError>;

/// A client for reading and writing objects through a node's SDO server
///
/// Only expedited transfers are supported, i.e. values of 1 to 4 bytes.
#[derive(Debug)]
pub struct SdoClient<S, R> {
    req_cob_id: CanId,
    resp_cob_id: CanId,
    timeout: Duration,
    sender: S,
    receiver: R,
}

impl<S: CanSender, R: CanReceiver> SdoClient<S, R> {
    /// Create a client for the default SDO server of `server_node_id`
    pub fn new_std(server_node_id: NodeId, sender: S, receiver: R) -> Self {
        Self {
            req_cob_id: CanId::Std(SDO_REQ_BASE + server_node_id.raw() as u16),
            resp_cob_id: CanId::Std(SDO_RESP_BASE + server_node_id.raw() as u16),
            timeout: DEFAULT_RESPONSE_TIMEOUT,
            sender,
            receiver,
        }
    }

    /// Set how long to wait for each response
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Write `data` to an object
    pub fn download(&mut self, index: u16, sub: u8, data: &[u8]) -> Result<()> {
        let request = SdoRequest::expedited_download(index, sub, data)
            .ok_or_else(|| UnsupportedSnafu { len: data.len() }.build())?;
        log::debug!("SDO download 0x{index:04X} 0x{sub:02X} {data:02X?}");
        self.send(request)?;

        match self.wait_for_response(index, sub)? {
            SdoResponse::ConfirmDownload { .. } => Ok(()),
            SdoResponse::Abort { abort_code, .. } => ServerAbortSnafu {
                index,
                sub,
                abort_code,
            }
            .fail(),
            _ => UnexpectedResponseSnafu.fail(),
        }
    }

    /// Read an object
    pub fn upload(&mut self, index: u16, sub: u8) -> Result<Vec<u8>> {
        self.send(SdoRequest::initiate_upload(index, sub))?;

        match self.wait_for_response(index, sub)? {
            SdoResponse::ConfirmUpload {
                n, e: true, s, data, ..
            } => {
                // Without the size flag the server does not say how many bytes are valid
                let len = if s { 4 - n as usize } else { 4 };
                log::debug!(
                    "SDO upload 0x{index:04X} 0x{sub:02X} {:02X?}",
                    &data[0..len]
                );
                Ok(data[0..len].to_vec())
            }
            SdoResponse::ConfirmUpload { e: false, data, .. } => {
                // The server wants a segmented transfer; tell it we will not follow
                let _ = self.send(SdoRequest::abort(
                    index,
                    sub,
                    AbortCode::InvalidCommandSpecifier,
                ));
                UnsupportedSnafu {
                    len: u32::from_le_bytes(data) as usize,
                }
                .fail()
            }
            SdoResponse::Abort { abort_code, .. } => ServerAbortSnafu {
                index,
                sub,
                abort_code,
            }
            .fail(),
            _ => UnexpectedResponseSnafu.fail(),
        }
    }

    fn send(&mut self, request: SdoRequest) -> Result<()> {
        self.sender
            .send(request.to_can_message(self.req_cob_id))
            .map_err(|_| SendFailedSnafu.build())
    }

    /// Wait for the server's answer about `(index, sub)`
    ///
    /// Responses about any other object are late answers to earlier requests, and are dropped.
    fn wait_for_response(&mut self, index: u16, sub: u8) -> Result<SdoResponse> {
        let mut timeout = self.timeout;
        let wait_until = Instant::now() + timeout;
        loop {
            let msg = self
                .receiver
                .recv(timeout)
                .map_err(|_| NoResponseSnafu.build())?;
            if msg.id == self.resp_cob_id {
                let response: SdoResponse =
                    msg.try_into().map_err(|_| MalformedResponseSnafu.build())?;
                if response.object() == (index, sub) {
                    return Ok(response);
                }
                let (stale_index, stale_sub) = response.object();
                log::debug!(
                    "Dropping SDO response for 0x{stale_index:04X} 0x{stale_sub:02X} while waiting for 0x{index:04X} 0x{sub:02X}"
                );
            }
            timeout = wait_until.saturating_duration_since(Instant::now());
            if timeout.is_zero() {
                return NoResponseSnafu.fail();
            }
        }
    }
}
