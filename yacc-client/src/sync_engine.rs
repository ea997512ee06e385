//! Bulk transfer of a whole object dictionary to or from a node
//!
//! [Download] and [Upload] are iterators which perform one SDO transfer per call to `next`, so the
//! caller can report progress between entries or stop early. Both stop for good after the first
//! error.
use std::iter::FusedIterator;

use snafu::{OptionExt, ResultExt, Snafu};
use yacc_common::{
    objects::{AccessType, ObjectId},
    value::{encode_value, FormatError},
    NodeId, ObjectDictionary, OdEntry, OdNode,
};

use crate::{
    connection::{Connection, TransferError},
    pdo_guard::{GuardError, PdoGuard},
};

/// Error which stops a bulk transfer
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SyncError {
    /// The entry has neither a parameter value nor a default value to write
    #[snafu(display("No value for 0x{index:04X} 0x{sub:02X} {name}"))]
    NoValue {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
        /// Entry name
        name: String,
    },
    /// The entry's value text could not be encoded for its data type
    #[snafu(display("Problem with the value of 0x{index:04X} 0x{sub:02X} {name}: {source}"))]
    Encode {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
        /// Entry name
        name: String,
        /// The cause
        source: FormatError,
    },
    /// Writing the entry failed
    #[snafu(display("Problem writing 0x{index:04X} 0x{sub:02X} {name}: {source}"))]
    Write {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
        /// Entry name
        name: String,
        /// The cause
        source: GuardError,
    },
    /// Reading the entry failed
    #[snafu(display("Problem reading 0x{index:04X} 0x{sub:02X} {name}: {source}"))]
    Read {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
        /// Entry name
        name: String,
        /// The cause
        source: TransferError,
    },
    /// A planned entry is missing from the dictionary being filled
    #[snafu(display("0x{index:04X} 0x{sub:02X} is not in the dictionary"))]
    NotInDictionary {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
    },
}

impl SyncError {
    /// The entry the error occurred on
    pub fn object(&self) -> ObjectId {
        match self {
            SyncError::NoValue { index, sub, .. }
            | SyncError::Encode { index, sub, .. }
            | SyncError::Write { index, sub, .. }
            | SyncError::Read { index, sub, .. }
            | SyncError::NotInDictionary { index, sub } => ObjectId::new(*index, *sub),
        }
    }
}

/// Progress of a bulk transfer, yielded once per entry transferred
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncProgress {
    /// Entries transferred so far
    pub done: usize,
    /// Entries the operation will transfer in total
    pub total: usize,
}

/// Direction of a bulk transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncDirection {
    /// File to device
    Download,
    /// Device to file
    Upload,
}

/// The entries a download writes, in write order
///
/// Only read-write entries are written. Objects are taken in dictionary order; within a record,
/// sub 0 is written last, so a mapping count follows the entries it counts.
fn download_plan(dictionary: &ObjectDictionary) -> Vec<&OdEntry> {
    let writable = |e: &&OdEntry| e.access_type == AccessType::Rw;
    let mut plan = Vec::new();
    for node in dictionary.iter() {
        match node {
            OdNode::Variable(entry) => plan.extend(Some(entry).filter(writable)),
            OdNode::Record(record) => {
                plan.extend(
                    record
                        .entries
                        .iter()
                        .filter(|e| e.subindex != 0)
                        .filter(writable),
                );
                plan.extend(record.entries.iter().filter(|e| e.subindex == 0).filter(writable));
            }
        }
    }
    plan
}

/// The entries an upload reads, in read order
///
/// Every readable entry, in dictionary order and ascending sub index. Write-only entries cannot be
/// read back and are skipped.
fn upload_plan(dictionary: &ObjectDictionary) -> Vec<ObjectId> {
    dictionary
        .entries()
        .filter(|e| e.access_type.is_readable())
        .map(|e| e.id())
        .collect()
}

/// The number of progress ticks a bulk transfer of `dictionary` will produce
pub fn entry_count(dictionary: &ObjectDictionary, direction: SyncDirection) -> usize {
    match direction {
        SyncDirection::Download => download_plan(dictionary).len(),
        SyncDirection::Upload => upload_plan(dictionary).len(),
    }
}

/// Writes every read-write entry of a dictionary to the node
///
/// Created by [Session::download](crate::Session::download).
#[derive(Debug)]
pub struct Download<'a, C: ?Sized> {
    connection: &'a mut C,
    node_id: NodeId,
    plan: Vec<&'a OdEntry>,
    position: usize,
    failed: bool,
}

impl<'a, C: Connection + ?Sized> Download<'a, C> {
    /// Prepare to write `source` through `connection`
    ///
    /// `node_id` is substituted into `$NODEID` expressions in the value texts.
    pub fn new(connection: &'a mut C, source: &'a ObjectDictionary, node_id: NodeId) -> Self {
        let plan = download_plan(source);
        log::info!("Downloading {} entries to node {}", plan.len(), node_id);
        Self {
            connection,
            node_id,
            plan,
            position: 0,
            failed: false,
        }
    }

    /// Total ticks this download produces when it runs to completion
    pub fn total(&self) -> usize {
        self.plan.len()
    }

    fn write_entry(&mut self, entry: &OdEntry) -> Result<(), SyncError> {
        let (index, sub, name) = (entry.index, entry.subindex, entry.name.as_str());
        let text = entry
            .value_text()
            .ok_or_else(|| NoValueSnafu { index, sub, name }.build())?;
        let raw = encode_value(entry.data_type, text, self.node_id.raw())
            .context(EncodeSnafu { index, sub, name })?;
        PdoGuard::new(&mut *self.connection, index)
            .write(sub, &raw)
            .context(WriteSnafu { index, sub, name })?;
        Ok(())
    }
}

impl<C: Connection + ?Sized> Iterator for Download<'_, C> {
    type Item = Result<SyncProgress, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let entry = *self.plan.get(self.position)?;
        self.position += 1;
        let progress = SyncProgress {
            done: self.position,
            total: self.plan.len(),
        };
        match self.write_entry(entry) {
            Ok(()) => {
                if progress.done == progress.total {
                    log::info!("Download complete");
                }
                Some(Ok(progress))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.failed {
            0
        } else {
            self.plan.len() - self.position
        };
        (0, Some(remaining))
    }
}

impl<C: Connection + ?Sized> FusedIterator for Download<'_, C> {}

/// Reads every readable entry of the node into a dictionary
///
/// Values land in [OdEntry::raw_value]. Created by [Session::upload](crate::Session::upload).
#[derive(Debug)]
pub struct Upload<'a, C: ?Sized> {
    connection: &'a mut C,
    dictionary: &'a mut ObjectDictionary,
    plan: Vec<ObjectId>,
    position: usize,
    failed: bool,
}

impl<'a, C: Connection + ?Sized> Upload<'a, C> {
    /// Prepare to read the entries of `dictionary` through `connection`
    pub fn new(connection: &'a mut C, dictionary: &'a mut ObjectDictionary) -> Self {
        let plan = upload_plan(dictionary);
        log::info!("Uploading {} entries", plan.len());
        Self {
            connection,
            dictionary,
            plan,
            position: 0,
            failed: false,
        }
    }

    /// Total ticks this upload produces when it runs to completion
    pub fn total(&self) -> usize {
        self.plan.len()
    }

    fn read_entry(&mut self, id: ObjectId) -> Result<(), SyncError> {
        let ObjectId { index, sub } = id;
        let entry = self
            .dictionary
            .entry_mut(index, sub)
            .context(NotInDictionarySnafu { index, sub })?;
        let value = self.connection.sdo_upload(index, sub).context(ReadSnafu {
            index,
            sub,
            name: entry.name.as_str(),
        })?;
        entry.raw_value = Some(value);
        Ok(())
    }
}

impl<C: Connection + ?Sized> Iterator for Upload<'_, C> {
    type Item = Result<SyncProgress, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let id = *self.plan.get(self.position)?;
        self.position += 1;
        let progress = SyncProgress {
            done: self.position,
            total: self.plan.len(),
        };
        match self.read_entry(id) {
            Ok(()) => {
                if progress.done == progress.total {
                    log::info!("Upload complete");
                }
                Some(Ok(progress))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.failed {
            0
        } else {
            self.plan.len() - self.position
        };
        (0, Some(remaining))
    }
}

impl<C: Connection + ?Sized> FusedIterator for Upload<'_, C> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Event, MockConnection};
    use yacc_common::{
        objects::{AccessType, DataType},
        NmtState, OdRecord,
    };

    fn var(index: u16, name: &str, data_type: DataType, access: AccessType, value: &str) -> OdNode {
        OdNode::Variable(OdEntry::new(index, 0, name, data_type, access).with_value(value))
    }

    fn mixed_dictionary() -> ObjectDictionary {
        ObjectDictionary::new()
            .with(var(0x1000, "Device type", DataType::UInt32, AccessType::Ro, "0x191"))
            .with(var(0x1017, "Heartbeat", DataType::UInt16, AccessType::Rw, "500"))
            .with(OdNode::Record(
                OdRecord::new(0x1A00, "TPDO1 mapping")
                    .with_entry(
                        OdEntry::new(0x1A00, 0, "Count", DataType::UInt8, AccessType::Rw)
                            .with_value("2"),
                    )
                    .with_entry(
                        OdEntry::new(0x1A00, 1, "Map 1", DataType::UInt32, AccessType::Rw)
                            .with_value("0x21000010"),
                    )
                    .with_entry(
                        OdEntry::new(0x1A00, 2, "Map 2", DataType::UInt32, AccessType::Rw)
                            .with_value("0x21010008"),
                    ),
            ))
            .with(OdNode::Record(
                OdRecord::new(0x1018, "Identity")
                    .with_entry(
                        OdEntry::new(0x1018, 0, "Count", DataType::UInt8, AccessType::Const)
                            .with_value("1"),
                    )
                    .with_entry(
                        OdEntry::new(0x1018, 1, "Vendor", DataType::UInt32, AccessType::Ro)
                            .with_value("0"),
                    ),
            ))
            .with(var(0x2000, "Command", DataType::UInt8, AccessType::Wo, "0"))
            .with(var(0x2100, "Speed", DataType::UInt16, AccessType::Rw, "1000"))
    }

    fn answering_node(dictionary: &ObjectDictionary) -> MockConnection {
        let mut node = MockConnection::default()
            .with_register(0x1800, 1, &[0x80, 0x01, 0x00, 0x80]);
        for entry in dictionary.entries() {
            node.registers
                .insert((entry.index, entry.subindex), vec![0; entry.data_type.size().unwrap_or(1)]);
        }
        node
    }

    #[test]
    fn test_download_tick_count_matches_entry_count() {
        let od = mixed_dictionary();
        let mut node = answering_node(&od);
        let ticks: Vec<_> = Download::new(&mut node, &od, NodeId::new(5).unwrap())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entry_count(&od, SyncDirection::Download), ticks.len());
        assert_eq!(5, ticks.len());
        assert_eq!(
            SyncProgress { done: 5, total: 5 },
            *ticks.last().unwrap()
        );
    }

    #[test]
    fn test_upload_tick_count_matches_entry_count() {
        let mut od = mixed_dictionary();
        let mut node = answering_node(&od);
        let expected = entry_count(&od, SyncDirection::Upload);
        let ticks = Upload::new(&mut node, &mut od).count();
        assert_eq!(expected, ticks);
        // Everything but the write-only entry
        assert_eq!(8, ticks);
        assert_eq!(Some(vec![0, 0]), od.entry(0x2100, 0).unwrap().raw_value);
        assert_eq!(None, od.entry(0x2000, 0).unwrap().raw_value);
    }

    #[test]
    fn test_download_writes_mapping_count_last() {
        let od = mixed_dictionary();
        let mut node = answering_node(&od);
        Download::new(&mut node, &od, NodeId::new(5).unwrap())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        // The TPDO is invalid with nothing mapped, so the guard adds no writes of its own
        let writes: Vec<(u16, u8)> = node
            .downloads()
            .into_iter()
            .map(|(index, sub, _)| (index, sub))
            .collect();
        assert_eq!(
            vec![
                (0x1017, 0),
                (0x1A00, 1),
                (0x1A00, 2),
                (0x1A00, 0),
                (0x2100, 0),
            ],
            writes
        );
    }

    #[test]
    fn test_upload_reads_in_ascending_subindex() {
        let mut od = mixed_dictionary();
        let mut node = answering_node(&od);
        Upload::new(&mut node, &mut od)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let reads: Vec<Event> = node
            .events
            .into_iter()
            .filter(|e| matches!(e, Event::Upload(0x1A00, _)))
            .collect();
        assert_eq!(
            vec![
                Event::Upload(0x1A00, 0),
                Event::Upload(0x1A00, 1),
                Event::Upload(0x1A00, 2)
            ],
            reads
        );
    }

    #[test]
    fn test_single_unguarded_entry() {
        let od = ObjectDictionary::new().with(OdNode::Record(
            OdRecord::new(0x2100, "Drive").with_entry(
                OdEntry::new(0x2100, 1, "Speed", DataType::UInt16, AccessType::Rw)
                    .with_value("1000"),
            ),
        ));
        let mut node = MockConnection::default();
        let ticks: Vec<_> = Download::new(&mut node, &od, NodeId::default()).collect();
        assert_eq!(1, ticks.len());
        assert_eq!(vec![Event::Download(0x2100, 1, vec![0xE8, 0x03])], node.events);
    }

    #[test]
    fn test_download_stops_at_first_error() {
        let od = mixed_dictionary();
        let mut node = answering_node(&od);
        node.registers.insert((0x1A00, 0), vec![2]);
        node.fail_downloads.insert((0x1A00, 2));
        let mut download = Download::new(&mut node, &od, NodeId::new(5).unwrap());
        assert!(download.next().unwrap().is_ok());
        assert!(download.next().unwrap().is_ok());
        let err = download.next().unwrap().unwrap_err();
        assert_eq!(ObjectId::new(0x1A00, 2), err.object());
        match &err {
            SyncError::Write { name, .. } => assert_eq!("Map 2", name),
            other => panic!("Unexpected error {other:?}"),
        }
        assert!(download.next().is_none());
        assert!(download.next().is_none());
        // The guard put the mapping count back even though the write failed
        assert_eq!(Some(&[2u8][..]), node.register(0x1A00, 0));
        assert!(!node.downloads().iter().any(|(index, _, _)| *index == 0x2100));
    }

    #[test]
    fn test_encode_failure_names_entry() {
        let od = ObjectDictionary::new().with(var(
            0x2100,
            "Speed",
            DataType::UInt8,
            AccessType::Rw,
            "1000",
        ));
        let mut node = MockConnection::default();
        let result: Result<Vec<_>, _> =
            Download::new(&mut node, &od, NodeId::default()).collect();
        assert!(matches!(
            result,
            Err(SyncError::Encode { index: 0x2100, sub: 0, .. })
        ));
        assert!(node.events.is_empty());
    }

    #[test]
    fn test_node_id_substitution() {
        let od = ObjectDictionary::new().with(OdNode::Record(
            OdRecord::new(0x1800, "TPDO1 communication").with_entry(
                OdEntry::new(0x1800, 1, "COB-ID", DataType::UInt32, AccessType::Rw)
                    .with_value("$NODEID+0x180"),
            ),
        ));
        let mut node = MockConnection::default().with_register(0x1800, 1, &[0x85, 0x01, 0, 0x80]);
        Download::new(&mut node, &od, NodeId::new(5).unwrap())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(Some(&[0x85u8, 0x01, 0, 0][..]), node.register(0x1800, 1));
        assert_eq!(NmtState::PreOperational, node.state);
    }

    #[test]
    fn test_upload_of_unknown_entry_fails() {
        let mut od = mixed_dictionary();
        let mut node = answering_node(&od);
        let mut upload = Upload {
            connection: &mut node,
            dictionary: &mut od,
            plan: vec![ObjectId::new(0x1000, 0), ObjectId::new(0x3000, 0)],
            position: 0,
            failed: false,
        };
        assert_eq!(Some(Ok(SyncProgress { done: 1, total: 2 })), upload.next());
        assert_eq!(
            Some(Err(SyncError::NotInDictionary {
                index: 0x3000,
                sub: 0
            })),
            upload.next()
        );
        assert_eq!(None, upload.next());
        // Nothing is requested for an entry with nowhere to store the value
        assert!(!node.events.contains(&Event::Upload(0x3000, 0)));
    }

    #[test]
    fn test_missing_value() {
        let od = ObjectDictionary::new().with(OdNode::Variable(OdEntry::new(
            0x2100,
            0,
            "Speed",
            DataType::UInt16,
            AccessType::Rw,
        )));
        let mut node = MockConnection::default();
        let mut download = Download::new(&mut node, &od, NodeId::default());
        assert!(matches!(
            download.next(),
            Some(Err(SyncError::NoValue { .. }))
        ));
    }
}
