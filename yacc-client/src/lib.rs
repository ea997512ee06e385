//! A client for configuring CANopen nodes
//!
//! The crate provides:
//!
//! - A [Session] which owns the connection to one node and its object dictionary, and exposes
//!   single entry reads and writes, bulk [upload](Session::upload) and
//!   [download](Session::download), and the save / restore-defaults commands
//! - A [PdoGuard] which suspends a live PDO around writes to its configuration objects
//! - A blocking [SDO client](SdoClient) and [NMT client](NmtClient) over any
//!   [CanSender](common::traits::CanSender) / [CanReceiver](common::traits::CanReceiver) pair
//! - A [SessionConfig] TOML file format describing the bus and the node
//!
//! Only expedited SDO transfers are supported, which covers every object of up to 4 bytes.
#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod can_connection;
mod config;
mod connection;
mod nmt_client;
mod pdo_guard;
mod sdo_client;
mod session;
#[cfg(feature = "socketcan")]
mod socketcan;
mod sync_engine;
#[cfg(test)]
mod test_utils;

pub use yacc_common as common;

pub use can_connection::CanConnection;
pub use config::{BusConfig, ConfigError, InterfaceKind, NodeSection, SessionConfig, Timeouts};
pub use connection::{ConnectError, Connection, LivenessError, TransferError, Transport};
pub use nmt_client::NmtClient;
pub use pdo_guard::{GuardError, PdoBlock, PdoDirection, PdoGuard, PdoParameter, PdoState};
pub use sdo_client::SdoClient;
pub use session::{Session, SessionError};
#[cfg(feature = "socketcan")]
#[cfg_attr(docsrs, doc(cfg(feature = "socketcan")))]
pub use socketcan::SocketCanTransport;
pub use sync_engine::{
    entry_count, Download, SyncDirection, SyncError, SyncProgress, Upload,
};
