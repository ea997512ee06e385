use std::{fmt::Write as _, path::Path};

use snafu::{ResultExt as _, Snafu};
use yacc_common::{
    objects::ObjectCode,
    value::format_value,
    NodeId, ObjectDictionary, OdEntry, OdNode,
};

use crate::loader::OBJECT_LISTS;

/// Error returned when writing a DCF file
#[derive(Debug, Snafu)]
pub enum ExportError {
    /// The file could not be written
    #[snafu(display("Failed to write {}: {source}", path.display()))]
    Io {
        /// The destination path
        path: std::path::PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },
}

/// Which object list an index is declared in
fn object_list(index: u16) -> &'static str {
    match index {
        0x1000 | 0x1001 | 0x1018 => OBJECT_LISTS[0],
        0x2000..=0x5FFF => OBJECT_LISTS[2],
        _ => OBJECT_LISTS[1],
    }
}

fn write_entry(out: &mut String, section: &str, entry: &OdEntry) {
    // Writing to a String cannot fail
    let _ = writeln!(out, "[{}]", section);
    let _ = writeln!(out, "ParameterName={}", entry.name);
    let _ = writeln!(out, "ObjectType=0x{:X}", ObjectCode::Var as u8);
    let _ = writeln!(out, "DataType=0x{:04X}", u16::from(entry.data_type));
    let _ = writeln!(out, "AccessType={}", entry.access_type.as_str());
    if let Some(default) = &entry.default_value {
        let _ = writeln!(out, "DefaultValue={}", default);
    }
    let _ = writeln!(out, "PDOMapping={}", entry.pdo_mapping as u8);
    if let Some(value) = parameter_value(entry) {
        let _ = writeln!(out, "ParameterValue={}", value);
    }
    out.push('\n');
}

/// The value to record for an entry: what was read from the device, else what the file had
fn parameter_value(entry: &OdEntry) -> Option<String> {
    match &entry.raw_value {
        Some(raw) => Some(format_value(entry.data_type, raw)),
        None => entry.parameter_value.clone(),
    }
}

/// Render a dictionary as DCF text
///
/// Values read from the device are written as `ParameterValue`. `file_name` is recorded in the
/// `[FileInfo]` section and `node_id` in `[DeviceComissioning]`.
pub fn dcf_to_string(dictionary: &ObjectDictionary, node_id: NodeId, file_name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[FileInfo]");
    let _ = writeln!(out, "FileName={}", file_name);
    let _ = writeln!(out, "FileVersion=1");
    let _ = writeln!(out, "FileRevision=0");
    let _ = writeln!(out, "EDSVersion=4.0");
    let _ = writeln!(out, "Description=Configuration of node {}", node_id);
    let _ = writeln!(out, "CreatedBy=yacc");
    out.push('\n');

    let _ = writeln!(out, "[DeviceComissioning]");
    let _ = writeln!(out, "NodeID=0x{:02X}", node_id.raw());
    out.push('\n');

    for list in OBJECT_LISTS {
        let nodes: Vec<&OdNode> = dictionary
            .iter()
            .filter(|node| object_list(node.index()) == list)
            .collect();
        if nodes.is_empty() {
            continue;
        }

        let _ = writeln!(out, "[{}]", list);
        let _ = writeln!(out, "SupportedObjects={}", nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            let _ = writeln!(out, "{}=0x{:04X}", i + 1, node.index());
        }
        out.push('\n');

        for node in nodes {
            match node {
                OdNode::Variable(entry) => {
                    write_entry(&mut out, &format!("{:X}", entry.index), entry)
                }
                OdNode::Record(record) => {
                    let _ = writeln!(out, "[{:X}]", record.index);
                    let _ = writeln!(out, "ParameterName={}", record.name);
                    let _ = writeln!(out, "ObjectType=0x{:X}", record.object_code as u8);
                    let _ = writeln!(out, "SubNumber=0x{:X}", record.entries.len());
                    out.push('\n');
                    for entry in &record.entries {
                        write_entry(
                            &mut out,
                            &format!("{:X}sub{:X}", record.index, entry.subindex),
                            entry,
                        );
                    }
                }
            }
        }
    }
    out
}

/// Write a dictionary to a DCF file
pub fn export_dcf<P: AsRef<Path>>(
    dictionary: &ObjectDictionary,
    node_id: NodeId,
    path: P,
) -> Result<(), ExportError> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let text = dcf_to_string(dictionary, node_id, &file_name);
    std::fs::write(path, text).context(IoSnafu { path })?;
    log::info!("Wrote {} objects to {}", dictionary.len(), path.display());
    Ok(())
}
