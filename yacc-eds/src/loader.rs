use configparser::ini::Ini;
use snafu::{ResultExt as _, Snafu};
use std::{collections::HashMap, path::Path};

use yacc_common::{
    objects::{AccessType, DataType, ObjectCode},
    ObjectDictionary, OdEntry, OdNode, OdRecord,
};

type ConfigMap = HashMap<String, HashMap<String, Option<String>>>;

/// The three object list sections of an EDS/DCF, in the order they are written
pub(crate) const OBJECT_LISTS: [&str; 3] =
    ["MandatoryObjects", "OptionalObjects", "ManufacturerObjects"];

/// Error returned when reading an EDS or DCF file
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LoadError {
    /// The file is not a valid INI file
    #[snafu(display("Invalid INI format: {message}"))]
    IniFormatError {
        /// Message from the INI parser
        message: String,
    },
    /// The INI structure does not describe a valid object dictionary
    #[snafu(display("Invalid EDS: {message}"))]
    EdsFormatError {
        /// Description of the problem
        message: String,
    },
    /// A numeric field could not be parsed
    #[snafu(display("{message}: {source}"))]
    ParseIntError {
        /// Which field was being parsed
        message: String,
        /// The parse failure
        source: std::num::ParseIntError,
    },
}

struct Section<'a> {
    map: &'a HashMap<String, Option<String>>,
    section: String,
}

trait ParseInt {
    fn parse_hex(&self) -> Result<u32, std::num::ParseIntError>;
    fn parse_int(&self) -> Result<u32, std::num::ParseIntError>;
}

impl<T: AsRef<str>> ParseInt for T {
    /// Parse a number which is always hex, with or without a 0x prefix
    fn parse_hex(&self) -> Result<u32, std::num::ParseIntError> {
        let s = self.as_ref().trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u32::from_str_radix(digits, 16)
    }

    /// Parse a number which is decimal unless it carries a 0x prefix
    fn parse_int(&self) -> Result<u32, std::num::ParseIntError> {
        let s = self.as_ref().trim();
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(digits) => u32::from_str_radix(digits, 16),
            None => s.parse(),
        }
    }
}

impl<'a> Section<'a> {
    fn from_map(map: &'a ConfigMap, section: &str) -> Result<Self, LoadError> {
        Self::from_map_opt(map, section).ok_or_else(|| {
            EdsFormatSnafu {
                message: format!("Missing required section '{}'", section),
            }
            .build()
        })
    }

    fn from_map_opt(map: &'a ConfigMap, section: &str) -> Option<Self> {
        map.get(&section.to_lowercase()).map(|section_map| Self {
            map: section_map,
            section: section.to_string(),
        })
    }

    /// Read an optional field. A key with no `=` reads as an empty string.
    fn get_string_opt(&self, field: &str) -> Option<String> {
        self.map
            .get(&field.to_lowercase())
            .map(|value| value.clone().unwrap_or_default())
    }

    fn get_string(&self, field: &str) -> Result<String, LoadError> {
        self.get_string_opt(field).ok_or_else(|| {
            EdsFormatSnafu {
                message: format!("Missing required field '{}' in '{}'", field, self.section),
            }
            .build()
        })
    }

    fn get_u32(&self, field: &str) -> Result<u32, LoadError> {
        self.get_string(field)?.parse_int().context(ParseIntSnafu {
            message: format!("Parsing '{}' in section '{}'", field, self.section),
        })
    }

    fn get_u32_hex(&self, field: &str) -> Result<u32, LoadError> {
        self.get_string(field)?.parse_hex().context(ParseIntSnafu {
            message: format!("Parsing '{}' in section '{}'", field, self.section),
        })
    }

    /// Read an optional hex field
    ///
    /// Missing and empty fields both read as None
    fn get_u32_hex_opt(&self, field: &str) -> Result<Option<u32>, LoadError> {
        match self.get_string_opt(field) {
            Some(value) if !value.trim().is_empty() => {
                Ok(Some(value.parse_hex().context(ParseIntSnafu {
                    message: format!("Parsing '{}' in section '{}'", field, self.section),
                })?))
            }
            _ => Ok(None),
        }
    }

    /// Read an optional boolean field, stored as 0 or 1
    fn get_bool_opt(&self, field: &str) -> Result<bool, LoadError> {
        match self.get_string_opt(field) {
            Some(value) if !value.trim().is_empty() => {
                Ok(value.parse_int().context(ParseIntSnafu {
                    message: format!("Parsing '{}' in section '{}'", field, self.section),
                })? == 1)
            }
            _ => Ok(false),
        }
    }
}

fn str_to_access_type(s: &str) -> Result<AccessType, LoadError> {
    let s = s.trim().to_lowercase();
    match s.as_str() {
        "ro" => Ok(AccessType::Ro),
        "wo" => Ok(AccessType::Wo),
        // rwr and rww only hint at which PDO direction the object suits
        "rw" | "rwr" | "rww" => Ok(AccessType::Rw),
        "const" => Ok(AccessType::Const),
        _ => EdsFormatSnafu {
            message: format!("Invalid AccessType: '{}'", s),
        }
        .fail(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn get_entry(
    section: &Section,
    index: u16,
    subindex: u8,
    name: String,
) -> Result<OdEntry, LoadError> {
    Ok(OdEntry {
        index,
        subindex,
        name,
        data_type: DataType::from(section.get_u32_hex("DataType")? as u16),
        access_type: str_to_access_type(&section.get_string("AccessType")?)?,
        pdo_mapping: section.get_bool_opt("PDOMapping")?,
        default_value: non_empty(section.get_string_opt("DefaultValue")),
        parameter_value: non_empty(section.get_string_opt("ParameterValue")),
        raw_value: None,
    })
}

fn read_object(map: &ConfigMap, index: u16) -> Result<OdNode, LoadError> {
    let obj_section = Section::from_map(map, &format!("{:x}", index))?;
    let parameter_name = obj_section.get_string("ParameterName")?;
    let sub_number = obj_section.get_u32_hex_opt("SubNumber")?.unwrap_or(0);
    let object_code = match obj_section.get_u32_hex_opt("ObjectType")? {
        None => ObjectCode::Var,
        Some(code) => ObjectCode::try_from(code as u8).map_err(|_| {
            EdsFormatSnafu {
                message: format!("Invalid ObjectType {} for object 0x{:04X}", code, index),
            }
            .build()
        })?,
    };

    if sub_number == 0 {
        // No explicit sub objects; the object section describes sub 0 as well
        return Ok(OdNode::Variable(get_entry(
            &obj_section,
            index,
            0,
            parameter_name,
        )?));
    }

    let mut record = OdRecord::new(index, parameter_name);
    record.object_code = object_code;
    for sub in 0..=255u8 {
        // Not all subs are necessarily defined; e.g. there may be a sub1 and a sub3, but no sub2
        let Some(sub_section) = Section::from_map_opt(map, &format!("{:x}sub{:x}", index, sub))
        else {
            continue;
        };
        let name = sub_section.get_string("ParameterName")?;
        record.insert(get_entry(&sub_section, index, sub, name)?);
        if record.entries.len() == sub_number as usize {
            break;
        }
    }
    if record.entries.len() != sub_number as usize {
        log::warn!(
            "Object 0x{:04X} declares {} sub objects but {} were found",
            index,
            sub_number,
            record.entries.len()
        );
    }
    Ok(OdNode::Record(record))
}

fn read_object_list(map: &ConfigMap, name: &str) -> Result<Vec<u16>, LoadError> {
    // Files commonly leave out the lists they have no objects for
    let Some(top_section) = Section::from_map_opt(map, name) else {
        return Ok(Vec::new());
    };
    let num_objects = top_section.get_u32("SupportedObjects")?;
    let mut list = Vec::new();
    for i in 1..num_objects + 1 {
        list.push(top_section.get_u32_hex(&i.to_string())? as u16);
    }
    Ok(list)
}

/// Collect the listed objects in the order their sections appear in the file
///
/// An index listed more than once is kept once. A listed object with no section of its own sorts
/// last and fails when it is read.
fn declared_objects(map: &ConfigMap, sections: &[String]) -> Result<Vec<u16>, LoadError> {
    let mut indices: Vec<u16> = Vec::new();
    for list in OBJECT_LISTS {
        for index in read_object_list(map, list)? {
            if !indices.contains(&index) {
                indices.push(index);
            }
        }
    }
    let position = |index: &u16| {
        let name = format!("{:x}", index);
        sections
            .iter()
            .position(|s| *s == name)
            .unwrap_or(usize::MAX)
    };
    indices.sort_by_key(position);
    Ok(indices)
}

fn from_config_map(map: &ConfigMap, sections: &[String]) -> Result<ObjectDictionary, LoadError> {
    let indices = declared_objects(map, sections)?;

    let mut dictionary = ObjectDictionary::new();
    for index in indices {
        dictionary.insert(read_object(map, index)?);
    }
    Ok(dictionary)
}

/// Split a parsed INI into its section names, in file order, and a lookup map
fn into_parts(config: &Ini) -> (Vec<String>, ConfigMap) {
    let map: ConfigMap = config
        .get_map_ref()
        .iter()
        .map(|(name, fields)| {
            let fields = fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            (name.clone(), fields)
        })
        .collect();
    (config.sections(), map)
}

/// Parse an object dictionary from the text of an EDS or DCF file
///
/// Objects keep the order of their sections in the text, and sub objects are ordered by sub index.
pub fn dictionary_from_str<S: Into<String>>(text: S) -> Result<ObjectDictionary, LoadError> {
    let mut config = Ini::new();
    config
        .read(text.into())
        .map_err(|e| IniFormatSnafu { message: e }.build())?;
    let (sections, map) = into_parts(&config);
    from_config_map(&map, &sections)
}

/// Load an object dictionary from an EDS or DCF file
pub fn load_dictionary<P: AsRef<Path>>(path: P) -> Result<ObjectDictionary, LoadError> {
    let mut config = Ini::new();
    config
        .load(path)
        .map_err(|e| IniFormatSnafu { message: e }.build())?;
    let (sections, map) = into_parts(&config);
    let dictionary = from_config_map(&map, &sections)?;
    log::debug!("Loaded {} objects", dictionary.len());
    Ok(dictionary)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    pub(crate) const EDS: &str = include_str!("../tests/fixtures/sample.eds");

    #[test]
    fn test_load_keeps_section_order() {
        let mut eds_file = tempfile::NamedTempFile::new().unwrap();
        eds_file.write_all(EDS.as_bytes()).unwrap();

        let od = load_dictionary(eds_file.path()).unwrap();
        let indices: Vec<u16> = od.iter().map(|node| node.index()).collect();
        // 0x1018 is written before 0x1017
        assert_eq!(vec![0x1000, 0x1018, 0x1017, 0x1800, 0x1A00, 0x2100, 0x2101], indices);
    }

    #[test]
    fn test_objects_are_not_sorted_by_index() {
        let text = "[OptionalObjects]\nSupportedObjects=2\n1=0x2100\n2=0x1017\n\
                    [2100]\nParameterName=Speed\nObjectType=0x7\nDataType=0x0006\nAccessType=rw\n\
                    [1017]\nParameterName=Heartbeat\nObjectType=0x7\nDataType=0x0006\nAccessType=rw\n";
        let od = dictionary_from_str(text).unwrap();
        assert_eq!(vec!["Speed", "Heartbeat"], od.group_names());
        let entries: Vec<(u16, u8)> = od.entries().map(|e| (e.index, e.subindex)).collect();
        assert_eq!(vec![(0x2100, 0), (0x1017, 0)], entries);
    }

    #[test]
    fn test_object_listed_twice_is_loaded_once() {
        let text = "[MandatoryObjects]\nSupportedObjects=1\n1=0x1000\n\
                    [OptionalObjects]\nSupportedObjects=1\n1=0x1000\n\
                    [1000]\nParameterName=Device type\nObjectType=0x7\nDataType=0x0007\nAccessType=ro\n";
        let od = dictionary_from_str(text).unwrap();
        assert_eq!(vec!["Device type"], od.group_names());
    }

    #[test]
    fn test_records_and_values() {
        let od = dictionary_from_str(EDS).unwrap();

        let OdNode::Record(mapping) = od.get(0x1A00).unwrap() else {
            panic!("0x1A00 should be a record");
        };
        assert_eq!(ObjectCode::Record, mapping.object_code);
        let subs: Vec<u8> = mapping.entries.iter().map(|e| e.subindex).collect();
        assert_eq!(vec![0, 1, 2], subs);

        let speed = od.entry(0x2100, 0).unwrap();
        assert_eq!("Speed", speed.name);
        assert_eq!(DataType::UInt16, speed.data_type);
        assert_eq!(AccessType::Rw, speed.access_type);
        assert!(speed.pdo_mapping);
        assert_eq!(Some("1000"), speed.value_text());

        let cob_id = od.entry(0x1800, 1).unwrap();
        assert_eq!(Some("$NODEID+0x180"), cob_id.default_value.as_deref());

        // rwr collapses to rw
        assert_eq!(AccessType::Rw, od.entry(0x2101, 0).unwrap().access_type);
    }

    #[test]
    fn test_parameter_value_overrides_default() {
        let od = dictionary_from_str(EDS).unwrap();
        let heartbeat = od.entry(0x1017, 0).unwrap();
        assert_eq!(Some("0"), heartbeat.default_value.as_deref());
        assert_eq!(Some("500"), heartbeat.value_text());
    }

    #[test]
    fn test_missing_object_section() {
        let text = "[MandatoryObjects]\nSupportedObjects=1\n1=0x1000\n";
        let err = dictionary_from_str(text).unwrap_err();
        assert!(matches!(err, LoadError::EdsFormatError { .. }));
    }

    #[test]
    fn test_bad_access_type() {
        let text = "[OptionalObjects]\nSupportedObjects=1\n1=0x2000\n\
                    [2000]\nParameterName=X\nObjectType=0x7\nDataType=0x0005\nAccessType=rx\n";
        let err = dictionary_from_str(text).unwrap_err();
        assert!(matches!(err, LoadError::EdsFormatError { .. }));
    }
}
