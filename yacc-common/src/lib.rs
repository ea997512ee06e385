//! Common functionality shared among the yacc crates.
//!
//! Most users will have no reason to depend on this crate directly, as it is re-exported by
//! `yacc-client`.
#![warn(missing_docs, missing_copy_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod constants;
pub mod dictionary;
pub mod messages;
pub mod node_id;
pub mod objects;
pub mod sdo;
pub mod traits;
pub mod value;

#[cfg(feature = "socketcan")]
mod socketcan;

#[cfg(feature = "socketcan")]
#[cfg_attr(docsrs, doc(cfg(feature = "socketcan")))]
pub use socketcan::{open_socketcan, ReceiveError, SocketCanReceiver, SocketCanSender};

pub use dictionary::{NotFoundError, ObjectDictionary, OdEntry, OdNode, OdRecord};
pub use messages::{CanId, CanMessage, NmtState};
pub use node_id::NodeId;
pub use value::{Data, FormatError};
