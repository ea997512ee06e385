use std::path::PathBuf;

use snafu::{ResultExt, Snafu};
use yacc_common::{
    constants::{
        object_ids::{RESTORE_DEFAULTS, SAVE_OBJECTS},
        values::{ALL_PARAMETERS_SUB, RESTORE_SIGNATURE, SAVE_SIGNATURE},
    },
    traits::ObjectDictionarySource,
    value::{decode, Data},
    NodeId, NotFoundError, ObjectDictionary,
};

use crate::{
    config::SessionConfig,
    connection::{ConnectError, Connection, TransferError, Transport},
    pdo_guard::{GuardError, PdoGuard, PdoState},
    sync_engine::{Download, Upload},
};

/// Error returned when opening a [Session]
#[derive(Debug, Snafu)]
pub enum SessionError {
    /// The bus could not be opened
    #[snafu(display("Failed to connect: {source}"))]
    Connect {
        /// The cause
        source: ConnectError,
    },
    /// The object dictionary file could not be loaded
    #[snafu(display("Failed to load object dictionary {}: {source}", path.display()))]
    Dictionary {
        /// The file
        path: PathBuf,
        /// The cause
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// A connection to one node, and the object dictionary describing it
///
/// All operations on the node go through the session, one at a time.
#[derive(Debug)]
pub struct Session<C> {
    connection: C,
    dictionary: ObjectDictionary,
    node_id: NodeId,
}

impl<C: Connection> Session<C> {
    /// Create a session from an open connection
    pub fn new(connection: C, dictionary: ObjectDictionary, node_id: NodeId) -> Self {
        Self {
            connection,
            dictionary,
            node_id,
        }
    }

    /// Load the configured object dictionary and open the bus
    ///
    /// The dictionary is loaded first, so a bad file never touches the bus. With no dictionary
    /// configured the session starts with an empty one, which still allows single entry access.
    pub fn connect<T, S>(
        transport: &T,
        source: &S,
        config: &SessionConfig,
    ) -> Result<Self, SessionError>
    where
        T: Transport<Connection = C>,
        S: ObjectDictionarySource,
    {
        let dictionary = match &config.node.object_dictionary {
            Some(path) => source.load(path).map_err(|e| SessionError::Dictionary {
                path: path.clone(),
                source: Box::new(e),
            })?,
            None => ObjectDictionary::new(),
        };
        let connection = transport.connect(config).context(ConnectSnafu)?;
        log::info!(
            "Connected to node {} ({} objects)",
            config.node.id,
            dictionary.len()
        );
        Ok(Self::new(connection, dictionary, config.node.id))
    }

    /// Close the session
    ///
    /// The connection and the dictionary, including any uploaded values, are dropped.
    pub fn disconnect(self) {
        log::info!("Disconnected from node {}", self.node_id);
    }

    /// The configured node
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The node's object dictionary
    pub fn dictionary(&self) -> &ObjectDictionary {
        &self.dictionary
    }

    /// Names of the top-level objects, in dictionary order
    pub fn group_names(&self) -> Vec<&str> {
        self.dictionary.group_names()
    }

    /// Names of the entries of a record
    pub fn subentry_names(&self, group: &str) -> Result<Vec<&str>, NotFoundError> {
        self.dictionary.subentry_names(group)
    }

    /// Read one object from the node
    pub fn read_one(&mut self, index: u16, sub: u8) -> Result<Data, TransferError> {
        let raw = self.connection.sdo_upload(index, sub)?;
        Ok(decode(&raw))
    }

    /// Write one object on the node, guarding PDO configuration objects
    pub fn write_one(&mut self, index: u16, sub: u8, raw: &[u8]) -> Result<PdoState, GuardError> {
        PdoGuard::new(&mut self.connection, index).write(sub, raw)
    }

    /// Write every read-write entry of `source` to the node
    ///
    /// `source` is usually a DCF loaded for the purpose, not the session's own dictionary.
    pub fn download<'a>(&'a mut self, source: &'a ObjectDictionary) -> Download<'a, C> {
        Download::new(&mut self.connection, source, self.node_id)
    }

    /// Read every readable entry of the session's dictionary from the node
    ///
    /// Write-only entries cannot be read back, so they are skipped and keep their file values.
    /// They are not counted in the progress total either.
    pub fn upload(&mut self) -> Upload<'_, C> {
        Upload::new(&mut self.connection, &mut self.dictionary)
    }

    /// Make the node store its current parameters in non-volatile memory
    pub fn save(&mut self) -> Result<(), GuardError> {
        log::info!("Saving parameters on node {}", self.node_id);
        self.write_one(SAVE_OBJECTS, ALL_PARAMETERS_SUB, &SAVE_SIGNATURE)?;
        Ok(())
    }

    /// Make the node restore its default parameters
    ///
    /// Most devices apply the defaults at the next reset.
    pub fn restore_defaults(&mut self) -> Result<(), GuardError> {
        log::info!("Restoring default parameters on node {}", self.node_id);
        self.write_one(RESTORE_DEFAULTS, ALL_PARAMETERS_SUB, &RESTORE_SIGNATURE)?;
        Ok(())
    }
}
