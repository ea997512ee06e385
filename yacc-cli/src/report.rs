//! Text printed for command results
use std::fmt::Write as _;

use yacc_client::{
    common::{objects::DataType, value::View, Data},
    PdoState, SyncProgress,
};

const VIEWS: [(View, &str); 4] = [
    (View::Unsigned, "unsigned"),
    (View::Signed, "signed"),
    (View::Float, "float"),
    (View::Hex, "hex"),
];

/// Describe a value read from the node
///
/// Every view is listed. When the object's data type is known, the view matching it is marked
/// with a `*`.
pub fn format_read(
    index: u16,
    sub: u8,
    name: Option<&str>,
    data_type: Option<DataType>,
    data: &Data,
) -> String {
    let mut out = format!("{index:04X}sub{sub:X}");
    if let Some(name) = name {
        write!(out, " {name}").ok();
    }
    if let Some(data_type) = data_type {
        write!(out, " ({data_type:?})").ok();
    }
    writeln!(out, ", {} bytes", data.len()).ok();

    let preferred = data_type.map(Data::preferred_view);
    for (view, label) in VIEWS {
        let marker = if preferred == Some(view) { " *" } else { "" };
        writeln!(out, "  {:<9} {}{marker}", format!("{label}:"), data.view_text(view)).ok();
    }
    out
}

/// One progress line of a bulk transfer
pub fn format_progress(verb: &str, progress: SyncProgress) -> String {
    format!("{verb} {}/{}", progress.done, progress.total)
}

/// Describe what a guarded write did to the PDO it configures, if anything
pub fn format_guard(state: PdoState) -> Option<String> {
    match (state.was_enabled, state.had_mapping) {
        (false, false) => None,
        (true, false) => Some("PDO was disabled during the write".to_string()),
        (false, true) => Some("PDO mapping was cleared during the write".to_string()),
        (true, true) => {
            Some("PDO was disabled and its mapping cleared during the write".to_string())
        }
    }
}
