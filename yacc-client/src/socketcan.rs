use snafu::ResultExt;
use yacc_common::{open_socketcan, SocketCanReceiver, SocketCanSender};

use crate::{
    can_connection::CanConnection,
    config::SessionConfig,
    connection::{ConnectError, OpenSnafu, Transport},
};

/// A [Transport] over Linux socketcan interfaces
///
/// PEAK, Kvaser and IXXAT adapters all appear as socketcan network interfaces on Linux, so every
/// [InterfaceKind](crate::InterfaceKind) is served by this transport. The bitrate is a property of
/// the network interface (`ip link set can0 type can bitrate ...`) and is not changed here.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketCanTransport;

impl Transport for SocketCanTransport {
    type Connection = CanConnection<SocketCanSender, SocketCanReceiver>;

    fn connect(&self, config: &SessionConfig) -> Result<Self::Connection, ConnectError> {
        let channel = config.bus.channel();
        log::info!(
            "Opening {} channel {} (expecting {} bit/s)",
            config.bus.interface,
            channel,
            config.bus.bitrate
        );
        let (sender, receiver) = open_socketcan(channel).context(OpenSnafu {
            interface: config.bus.interface,
            channel,
        })?;
        Ok(CanConnection::new(
            config.node.id,
            config.timeouts,
            sender,
            receiver,
        ))
    }
}
