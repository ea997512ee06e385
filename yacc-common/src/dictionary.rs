//! In-memory object dictionary
//!
//! An [ObjectDictionary] is an ordered list of [OdNode]s, each either a plain variable or a record
//! of sub entries. The order is the declaration order of the description it was loaded from, and
//! is the order in which bulk operations walk the dictionary.
//!
//! The lookup methods mirror what an operator does when picking an entry on screen: by group
//! (top-level object) name, then by entry name within the group.
use std::collections::HashMap;

use snafu::{OptionExt, Snafu};

use crate::objects::{AccessType, DataType, ObjectCode, ObjectId};

/// Error returned when a name or index is not present in the dictionary
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum NotFoundError {
    /// No top-level object with this name
    #[snafu(display("No object named '{name}'"))]
    Group {
        /// The requested name
        name: String,
    },
    /// The group exists, but has no entry with this name
    #[snafu(display("No entry named '{entry}' in '{group}'"))]
    Entry {
        /// The group name
        group: String,
        /// The requested entry name
        entry: String,
    },
    /// No object at this address
    #[snafu(display("No object at 0x{index:04X} 0x{sub:02X}"))]
    Index {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
    },
}

type Result<T> = std::result::Result<T, NotFoundError>;

/// A single value in the dictionary
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OdEntry {
    /// Object index
    pub index: u16,
    /// Sub index
    pub subindex: u8,
    /// Parameter name
    pub name: String,
    /// Declared data type
    pub data_type: DataType,
    /// Declared access type
    pub access_type: AccessType,
    /// True if the entry may be mapped into a PDO
    pub pdo_mapping: bool,
    /// The `DefaultValue` text from the description
    pub default_value: Option<String>,
    /// The `ParameterValue` text from a DCF
    pub parameter_value: Option<String>,
    /// Value most recently read from the device
    pub raw_value: Option<Vec<u8>>,
}

impl OdEntry {
    /// Create an entry with no values
    pub fn new<S: Into<String>>(
        index: u16,
        subindex: u8,
        name: S,
        data_type: DataType,
        access_type: AccessType,
    ) -> Self {
        Self {
            index,
            subindex,
            name: name.into(),
            data_type,
            access_type,
            ..Default::default()
        }
    }

    /// Set the parameter value text
    pub fn with_value<S: Into<String>>(mut self, value: S) -> Self {
        self.parameter_value = Some(value.into());
        self
    }

    /// The address of this entry
    pub fn id(&self) -> ObjectId {
        ObjectId::new(self.index, self.subindex)
    }

    /// The value to configure: the DCF `ParameterValue` if present, else the `DefaultValue`
    pub fn value_text(&self) -> Option<&str> {
        self.parameter_value
            .as_deref()
            .or(self.default_value.as_deref())
    }
}

/// An object holding several sub entries
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OdRecord {
    /// Object index
    pub index: u16,
    /// Parameter name
    pub name: String,
    /// Either [ObjectCode::Record] or [ObjectCode::Array]
    pub object_code: ObjectCode,
    /// The sub entries, in ascending sub index order
    pub entries: Vec<OdEntry>,
}

impl OdRecord {
    /// Create an empty record
    pub fn new<S: Into<String>>(index: u16, name: S) -> Self {
        Self {
            index,
            name: name.into(),
            object_code: ObjectCode::Record,
            entries: Vec::new(),
        }
    }

    /// Add a sub entry, keeping entries sorted by sub index
    pub fn with_entry(mut self, entry: OdEntry) -> Self {
        self.insert(entry);
        self
    }

    /// Add or replace a sub entry, keeping entries sorted by sub index
    pub fn insert(&mut self, entry: OdEntry) {
        match self
            .entries
            .binary_search_by_key(&entry.subindex, |e| e.subindex)
        {
            Ok(pos) => self.entries[pos] = entry,
            Err(pos) => self.entries.insert(pos, entry),
        }
    }

    /// Find a sub entry by sub index
    pub fn entry(&self, subindex: u8) -> Option<&OdEntry> {
        self.entries.iter().find(|e| e.subindex == subindex)
    }
}

/// A top-level object in the dictionary
#[derive(Clone, Debug, PartialEq)]
pub enum OdNode {
    /// A single value, at sub index 0
    Variable(OdEntry),
    /// A group of sub entries
    Record(OdRecord),
}

impl OdNode {
    /// The object index
    pub fn index(&self) -> u16 {
        match self {
            OdNode::Variable(entry) => entry.index,
            OdNode::Record(record) => record.index,
        }
    }

    /// The object name
    pub fn name(&self) -> &str {
        match self {
            OdNode::Variable(entry) => &entry.name,
            OdNode::Record(record) => &record.name,
        }
    }

    /// All values held by this object
    pub fn entries(&self) -> &[OdEntry] {
        match self {
            OdNode::Variable(entry) => std::slice::from_ref(entry),
            OdNode::Record(record) => &record.entries,
        }
    }

    /// All values held by this object, mutably
    pub fn entries_mut(&mut self) -> &mut [OdEntry] {
        match self {
            OdNode::Variable(entry) => std::slice::from_mut(entry),
            OdNode::Record(record) => &mut record.entries,
        }
    }
}

/// An ordered collection of objects
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectDictionary {
    nodes: Vec<OdNode>,
    positions: HashMap<u16, usize>,
}

impl ObjectDictionary {
    /// Create an empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an object
    ///
    /// An object with the same index is replaced in place, keeping its original position.
    pub fn insert(&mut self, node: OdNode) {
        match self.positions.get(&node.index()) {
            Some(&pos) => self.nodes[pos] = node,
            None => {
                self.positions.insert(node.index(), self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    /// Builder style [insert](Self::insert)
    pub fn with(mut self, node: OdNode) -> Self {
        self.insert(node);
        self
    }

    /// Iterate over objects in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &OdNode> {
        self.nodes.iter()
    }

    /// Iterate over every entry, in declaration order and ascending sub index
    pub fn entries(&self) -> impl Iterator<Item = &OdEntry> {
        self.nodes.iter().flat_map(|node| node.entries().iter())
    }

    /// Number of top-level objects
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if there are no objects
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get an object by index
    pub fn get(&self, index: u16) -> Option<&OdNode> {
        self.positions.get(&index).map(|&pos| &self.nodes[pos])
    }

    /// Get an entry by address
    pub fn entry(&self, index: u16, subindex: u8) -> Option<&OdEntry> {
        match self.get(index)? {
            OdNode::Variable(entry) => (entry.subindex == subindex).then_some(entry),
            OdNode::Record(record) => record.entry(subindex),
        }
    }

    /// Get an entry by address, mutably
    pub fn entry_mut(&mut self, index: u16, subindex: u8) -> Option<&mut OdEntry> {
        let pos = *self.positions.get(&index)?;
        self.nodes[pos]
            .entries_mut()
            .iter_mut()
            .find(|e| e.subindex == subindex)
    }

    fn group(&self, name: &str) -> Result<&OdNode> {
        self.nodes
            .iter()
            .find(|node| node.name() == name)
            .context(GroupSnafu { name })
    }

    fn group_entry(&self, group: &str, entry: &str) -> Result<&OdEntry> {
        match self.group(group)? {
            // A variable is its own single entry
            OdNode::Variable(var) if entry.is_empty() || entry == var.name => Ok(var),
            OdNode::Variable(_) => EntrySnafu { group, entry }.fail(),
            OdNode::Record(record) => record
                .entries
                .iter()
                .find(|e| e.name == entry)
                .context(EntrySnafu { group, entry }),
        }
    }

    /// Names of all top-level objects, in declaration order
    pub fn group_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.name()).collect()
    }

    /// Names of the sub entries of a group; empty for plain variables
    pub fn subentry_names(&self, group: &str) -> Result<Vec<&str>> {
        Ok(match self.group(group)? {
            OdNode::Variable(_) => Vec::new(),
            OdNode::Record(record) => record.entries.iter().map(|e| e.name.as_str()).collect(),
        })
    }

    /// The index of a group
    pub fn index_of(&self, group: &str) -> Result<u16> {
        Ok(self.group(group)?.index())
    }

    /// The sub index of an entry within a group
    ///
    /// For plain variables, `entry` may be empty or the variable's own name.
    pub fn subindex_of(&self, group: &str, entry: &str) -> Result<u8> {
        Ok(self.group_entry(group, entry)?.subindex)
    }

    /// The data type of an entry
    ///
    /// For plain variables `entry` is ignored, as the variable holds the only value
    pub fn data_type_of(&self, group: &str, entry: &str) -> Result<DataType> {
        match self.group(group)? {
            OdNode::Variable(var) => Ok(var.data_type),
            OdNode::Record(_) => Ok(self.group_entry(group, entry)?.data_type),
        }
    }

    /// The name of the object at `index`, if there is one
    ///
    /// A miss is not an error: an index typed by the operator may not be in the dictionary.
    pub fn group_of(&self, index: u16) -> Option<&str> {
        self.get(index).map(|node| node.name())
    }

    /// Look up an entry by address, failing with [NotFoundError::Index]
    pub fn require(&self, index: u16, subindex: u8) -> Result<&OdEntry> {
        self.entry(index, subindex)
            .context(IndexSnafu { index, sub: subindex })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ObjectDictionary {
        ObjectDictionary::new()
            .with(OdNode::Variable(OdEntry::new(
                0x1000,
                0,
                "Device type",
                DataType::UInt32,
                AccessType::Ro,
            )))
            .with(OdNode::Record(
                OdRecord::new(0x1A00, "TPDO1 mapping")
                    .with_entry(OdEntry::new(
                        0x1A00,
                        1,
                        "Mapped object 1",
                        DataType::UInt32,
                        AccessType::Rw,
                    ))
                    .with_entry(OdEntry::new(
                        0x1A00,
                        0,
                        "Number of entries",
                        DataType::UInt8,
                        AccessType::Rw,
                    )),
            ))
            .with(OdNode::Variable(OdEntry::new(
                0x2000,
                0,
                "Speed",
                DataType::Int16,
                AccessType::Rw,
            )))
    }

    #[test]
    fn test_group_enumeration_keeps_declaration_order() {
        let od = sample();
        assert_eq!(vec!["Device type", "TPDO1 mapping", "Speed"], od.group_names());
        assert_eq!(
            vec!["Number of entries", "Mapped object 1"],
            od.subentry_names("TPDO1 mapping").unwrap()
        );
        assert!(od.subentry_names("Speed").unwrap().is_empty());
    }

    #[test]
    fn test_name_lookups() {
        let od = sample();
        assert_eq!(0x1A00, od.index_of("TPDO1 mapping").unwrap());
        assert_eq!(1, od.subindex_of("TPDO1 mapping", "Mapped object 1").unwrap());
        assert_eq!(0, od.subindex_of("Speed", "").unwrap());
        assert_eq!(DataType::Int16, od.data_type_of("Speed", "").unwrap());
        assert_eq!(
            DataType::UInt8,
            od.data_type_of("TPDO1 mapping", "Number of entries").unwrap()
        );
    }

    #[test]
    fn test_lookup_failures() {
        let od = sample();
        assert_eq!(
            Err(NotFoundError::Group {
                name: "Missing".into()
            }),
            od.index_of("Missing")
        );
        assert_eq!(
            Err(NotFoundError::Entry {
                group: "TPDO1 mapping".into(),
                entry: "Nope".into()
            }),
            od.subindex_of("TPDO1 mapping", "Nope")
        );
        assert!(od.require(0x2000, 1).is_err());
    }

    #[test]
    fn test_group_of_is_a_soft_miss() {
        let od = sample();
        assert_eq!(Some("Speed"), od.group_of(0x2000));
        assert_eq!(None, od.group_of(0x3000));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut od = sample();
        od.insert(OdNode::Variable(OdEntry::new(
            0x1000,
            0,
            "Renamed",
            DataType::UInt32,
            AccessType::Ro,
        )));
        assert_eq!(3, od.len());
        assert_eq!("Renamed", od.group_names()[0]);

        od.entry_mut(0x1A00, 1).unwrap().raw_value = Some(vec![1, 2, 3, 4]);
        assert_eq!(Some(vec![1, 2, 3, 4]), od.entry(0x1A00, 1).unwrap().raw_value);
    }
}
