//! Reading and writing CANopen device description files
//!
//! An EDS (electronic data sheet) describes the objects a device type supports. A DCF (device
//! configuration file) is the same format with a `ParameterValue` recorded for each configured
//! object. Both load into a [yacc_common::ObjectDictionary]; dictionaries are written back out as
//! DCF.
#![warn(missing_docs)]

use std::path::Path;

use snafu::{ResultExt as _, Snafu};
use yacc_common::{traits::ObjectDictionarySource, NodeId, ObjectDictionary};

mod export;
mod loader;

pub use export::{dcf_to_string, export_dcf, ExportError};
pub use loader::{dictionary_from_str, load_dictionary, LoadError};

/// Error returned by [EdsSource]
#[derive(Debug, Snafu)]
pub enum EdsError {
    /// Reading the file failed
    #[snafu(display("Failed to load {}: {source}", path.display()))]
    Load {
        /// The file being read
        path: std::path::PathBuf,
        /// The cause
        source: LoadError,
    },
    /// Writing the file failed
    #[snafu(transparent)]
    Export {
        /// The cause
        source: ExportError,
    },
}

/// An [ObjectDictionarySource] backed by EDS/DCF files
#[derive(Debug, Clone, Copy, Default)]
pub struct EdsSource {
    node_id: NodeId,
}

impl EdsSource {
    /// Create a source which records `node_id` in exported files
    pub fn new(node_id: NodeId) -> Self {
        Self { node_id }
    }
}

impl ObjectDictionarySource for EdsSource {
    type Error = EdsError;

    fn load(&self, path: &Path) -> Result<ObjectDictionary, EdsError> {
        load_dictionary(path).context(LoadSnafu { path })
    }

    fn export(&self, dictionary: &ObjectDictionary, path: &Path) -> Result<(), EdsError> {
        Ok(export_dcf(dictionary, self.node_id, path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.eds");
        let err = EdsSource::default().load(&path).unwrap_err();
        assert!(matches!(
            err,
            EdsError::Load {
                source: LoadError::IniFormatError { .. },
                ..
            }
        ));
    }
}
