//! Conversions between raw object bytes and their textual views
//!
//! Values travel little-endian on the wire. For display, the bytes are reversed into a big-endian
//! hex string, and read as unsigned, signed and (for 4 byte values) single precision float.
use std::sync::OnceLock;

use regex::Regex;
use snafu::{ensure, ResultExt as _, Snafu};

use crate::objects::DataType;

/// Error returned when a value cannot be converted
#[derive(Debug, Clone, PartialEq, Snafu)]
pub enum FormatError {
    /// The text is not a hex string
    #[snafu(display("'{text}' is not a valid hex string: {source}"))]
    InvalidHex {
        /// The rejected input
        text: String,
        /// The decoder's complaint
        source: hex::FromHexError,
    },
    /// A hex value was expected, but there were no digits
    #[snafu(display("No hex digits in '{text}'"))]
    MissingDigits {
        /// The rejected input
        text: String,
    },
    /// The value needs more bytes than are available
    #[snafu(display("'{text}' does not fit in {length} bytes"))]
    Overflow {
        /// The rejected input
        text: String,
        /// The number of bytes available
        length: usize,
    },
    /// The text could not be parsed as a number of the expected kind
    #[snafu(display("'{text}' is not a valid {expected}"))]
    InvalidNumber {
        /// The rejected input
        text: String,
        /// What was expected
        expected: &'static str,
    },
    /// The requested byte length cannot hold a value
    #[snafu(display("A length of {length} bytes is not supported"))]
    InvalidLength {
        /// The requested length
        length: usize,
    },
    /// The data type has no textual encoding
    #[snafu(display("Values of type {data_type:?} cannot be encoded"))]
    UnsupportedType {
        /// The data type
        data_type: DataType,
    },
}

type Result<T> = std::result::Result<T, FormatError>;

/// The different representations of one raw value
///
/// Only the view matching the object's declared data type is semantically meaningful. Views which
/// the byte length cannot support are None.
#[derive(Clone, Debug, PartialEq)]
pub struct Data {
    /// The raw bytes, in wire (little-endian) order
    pub raw: Vec<u8>,
    /// Little-endian unsigned interpretation; available for 1 to 8 bytes
    pub unsigned: Option<u64>,
    /// Little-endian two's-complement interpretation; available for 1 to 8 bytes
    pub signed: Option<i64>,
    /// IEEE-754 single precision interpretation; available for exactly 4 bytes
    pub float: Option<f32>,
    /// Big-endian (display order) upper case hex string
    pub hex: String,
}

/// Identifies one of the views of a [Data]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum View {
    /// The unsigned view
    Unsigned,
    /// The signed view
    Signed,
    /// The float view
    Float,
    /// The hex view
    Hex,
}

impl Data {
    /// The number of raw bytes
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns true if no bytes were read
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// The view which is meaningful for an object of `data_type`
    pub fn preferred_view(data_type: DataType) -> View {
        if data_type.is_unsigned() {
            View::Unsigned
        } else if data_type.is_signed() {
            View::Signed
        } else if data_type == DataType::Real32 {
            View::Float
        } else {
            View::Hex
        }
    }

    /// Format one view, using "-" when the view is unavailable
    pub fn view_text(&self, view: View) -> String {
        match view {
            View::Unsigned => self.unsigned.map(|v| v.to_string()),
            View::Signed => self.signed.map(|v| v.to_string()),
            View::Float => self.float.map(|v| v.to_string()),
            View::Hex => Some(self.hex.clone()),
        }
        .unwrap_or_else(|| "-".to_string())
    }
}

/// Decode raw wire bytes into all of their views
pub fn decode(raw: &[u8]) -> Data {
    let display_order: Vec<u8> = raw.iter().rev().copied().collect();
    let hex = hex::encode_upper(display_order);

    let unsigned = if (1..=8).contains(&raw.len()) {
        Some(
            raw.iter()
                .rev()
                .fold(0u64, |acc, b| (acc << 8) | *b as u64),
        )
    } else {
        None
    };

    let signed = unsigned.map(|u| {
        let shift = 64 - 8 * raw.len() as u32;
        ((u << shift) as i64) >> shift
    });

    let float = if raw.len() == 4 {
        let mut display_order = [0u8; 4];
        for (dst, src) in display_order.iter_mut().zip(raw.iter().rev()) {
            *dst = *src;
        }
        Some(f32::from_be_bytes(display_order))
    } else {
        None
    };

    Data {
        raw: raw.to_vec(),
        unsigned,
        signed,
        float,
        hex,
    }
}

/// Parse a display order (big-endian) hex string into exactly `length` wire order bytes
///
/// Odd length strings are padded with a leading zero. An optional `0x` prefix is accepted.
pub fn encode_from_hex(hex: &str, length: usize) -> Result<Vec<u8>> {
    ensure!(length > 0, InvalidLengthSnafu { length });
    let trimmed = hex.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    ensure!(!digits.is_empty(), MissingDigitsSnafu { text: hex });

    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    let display_order = hex::decode(padded).context(InvalidHexSnafu { text: hex })?;

    // Leading zero bytes may be dropped; anything else must fit
    let excess = display_order.len().saturating_sub(length);
    ensure!(
        display_order[..excess].iter().all(|b| *b == 0),
        OverflowSnafu { text: hex, length }
    );

    let mut raw: Vec<u8> = display_order[excess..].iter().rev().copied().collect();
    raw.resize(length, 0);
    Ok(raw)
}

/// Encode a float as 4 wire order bytes
///
/// The value is encoded as a big-endian single, which is the display order; the bytes are then
/// reversed for the wire.
pub fn encode_from_float(value: f32) -> Vec<u8> {
    let mut raw = value.to_be_bytes().to_vec();
    raw.reverse();
    raw
}

/// Encode an unsigned integer as exactly `length` wire order bytes
pub fn encode_from_unsigned(value: u64, length: usize) -> Result<Vec<u8>> {
    ensure!((1..=8).contains(&length), InvalidLengthSnafu { length });
    ensure!(
        length == 8 || value >> (8 * length) == 0,
        OverflowSnafu {
            text: value.to_string(),
            length
        }
    );
    Ok(value.to_le_bytes()[..length].to_vec())
}

/// Encode a signed integer as exactly `length` wire order two's-complement bytes
pub fn encode_from_signed(value: i64, length: usize) -> Result<Vec<u8>> {
    ensure!((1..=8).contains(&length), InvalidLengthSnafu { length });
    if length < 8 {
        let bits = 8 * length as u32;
        let min = -(1i64 << (bits - 1));
        let max = (1i64 << (bits - 1)) - 1;
        ensure!(
            (min..=max).contains(&value),
            OverflowSnafu {
                text: value.to_string(),
                length
            }
        );
    }
    Ok(value.to_le_bytes()[..length].to_vec())
}

/// Encode the textual value of an EDS/DCF entry into wire bytes for `data_type`
///
/// Integers may be decimal, `0x` prefixed hex, or an expression involving `$NODEID`, which is
/// replaced by `node_id`.
pub fn encode_value(data_type: DataType, text: &str, node_id: u8) -> Result<Vec<u8>> {
    let text = text.trim();
    match data_type {
        DataType::Boolean => match text.to_lowercase().as_str() {
            "1" | "true" => Ok(vec![1]),
            "0" | "false" => Ok(vec![0]),
            _ => InvalidNumberSnafu {
                text,
                expected: "boolean",
            }
            .fail(),
        },
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            let value = parse_unsigned(text, node_id)?;
            encode_with_size(data_type, |size| encode_from_unsigned(value, size))
        }
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            let value = parse_signed(text, node_id)?;
            encode_with_size(data_type, |size| encode_from_signed(value, size))
        }
        DataType::Real32 => text
            .parse::<f32>()
            .map(|v| v.to_le_bytes().to_vec())
            .map_err(|_| {
                InvalidNumberSnafu {
                    text,
                    expected: "float",
                }
                .build()
            }),
        DataType::Real64 => text
            .parse::<f64>()
            .map(|v| v.to_le_bytes().to_vec())
            .map_err(|_| {
                InvalidNumberSnafu {
                    text,
                    expected: "double",
                }
                .build()
            }),
        DataType::VisibleString => Ok(text.as_bytes().to_vec()),
        DataType::UnicodeString => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
        DataType::OctetString | DataType::Domain => {
            let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            hex::decode(digits).context(InvalidHexSnafu { text })
        }
        DataType::Other(_) => UnsupportedTypeSnafu { data_type }.fail(),
    }
}

/// Format raw wire bytes as the textual value written to a DCF file
///
/// When the byte count does not match the data type, the value is written as `0x` prefixed
/// display order hex.
pub fn format_value(data_type: DataType, raw: &[u8]) -> String {
    let data = decode(raw);
    let fallback = || format!("0x{}", data.hex);
    if let Some(size) = data_type.size() {
        if size != raw.len() {
            return fallback();
        }
    }
    match data_type {
        DataType::Boolean
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => data.unsigned.map(|v| v.to_string()),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            data.signed.map(|v| v.to_string())
        }
        DataType::Real32 => data.float.map(|v| v.to_string()),
        DataType::Real64 => <[u8; 8]>::try_from(raw)
            .ok()
            .map(|bytes| f64::from_le_bytes(bytes).to_string()),
        DataType::VisibleString => Some(String::from_utf8_lossy(raw).into_owned()),
        DataType::UnicodeString => {
            let units: Vec<u16> = raw
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            Some(String::from_utf16_lossy(&units))
        }
        DataType::OctetString | DataType::Domain => {
            Some(hex::encode_upper(raw))
        }
        DataType::Other(_) => None,
    }
    .unwrap_or_else(fallback)
}

fn encode_with_size(
    data_type: DataType,
    encode: impl FnOnce(usize) -> Result<Vec<u8>>,
) -> Result<Vec<u8>> {
    match data_type.size() {
        Some(size) => encode(size),
        None => UnsupportedTypeSnafu { data_type }.fail(),
    }
}

fn node_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\$NODEID\s*\+\s*(\S+)$|^(\S+)\s*\+\s*\$NODEID$|^\$NODEID$")
            .expect("static regex")
    })
}

fn parse_u64_literal(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

fn parse_unsigned(text: &str, node_id: u8) -> Result<u64> {
    let invalid = || {
        InvalidNumberSnafu {
            text,
            expected: "unsigned integer",
        }
        .build()
    };
    if let Some(caps) = node_id_regex().captures(text) {
        let offset = match caps.get(1).or_else(|| caps.get(2)) {
            Some(m) => parse_u64_literal(m.as_str()).ok_or_else(invalid)?,
            None => 0,
        };
        return offset.checked_add(node_id as u64).ok_or_else(invalid);
    }
    parse_u64_literal(text).ok_or_else(invalid)
}

fn parse_signed(text: &str, node_id: u8) -> Result<i64> {
    if let Some(rest) = text.strip_prefix('-') {
        let magnitude = parse_u64_literal(rest).ok_or_else(|| {
            InvalidNumberSnafu {
                text,
                expected: "signed integer",
            }
            .build()
        })?;
        return 0i64.checked_sub_unsigned(magnitude).ok_or_else(|| {
            InvalidNumberSnafu {
                text,
                expected: "signed integer",
            }
            .build()
        });
    }
    let value = parse_unsigned(text, node_id)?;
    i64::try_from(value).map_err(|_| {
        InvalidNumberSnafu {
            text,
            expected: "signed integer",
        }
        .build()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertables::*;

    #[test]
    fn test_decode_views() {
        let data = decode(&[0xE8, 0x03]);
        assert_eq!(Some(1000), data.unsigned);
        assert_eq!(Some(1000), data.signed);
        assert_eq!(None, data.float);
        assert_eq!("03E8", data.hex);
        assert_eq!(2, data.len());

        let data = decode(&[0xFF, 0xFF]);
        assert_eq!(Some(0xFFFF), data.unsigned);
        assert_eq!(Some(-1), data.signed);
    }

    #[test]
    fn test_float_view_only_for_four_bytes() {
        // 0x3F800000 in display order
        let data = decode(&[0x00, 0x00, 0x80, 0x3F]);
        assert_eq!("3F800000", data.hex);
        assert_eq!(Some(1.0), data.float);

        for len in [1usize, 2, 3, 5, 8] {
            assert_eq!(None, decode(&vec![0u8; len]).float, "length {len}");
        }
    }

    #[test]
    fn test_views_unavailable_for_long_values() {
        let data = decode(b"device name");
        assert_eq!(None, data.unsigned);
        assert_eq!(None, data.signed);
        assert_eq!("-", data.view_text(View::Unsigned));
        assert_eq!(22, data.hex.len());
    }

    #[test]
    fn test_signed_sign_extension() {
        assert_eq!(Some(-128), decode(&[0x80]).signed);
        assert_eq!(Some(-2), decode(&[0xFE, 0xFF, 0xFF, 0xFF]).signed);
        assert_eq!(Some(i64::MIN), decode(&[0, 0, 0, 0, 0, 0, 0, 0x80]).signed);
        assert_eq!(Some(127), decode(&[0x7F]).signed);
    }

    #[test]
    fn test_hex_round_trip() {
        for length in [1usize, 2, 4, 8] {
            for seed in [0u8, 0x01, 0x5A, 0x80, 0xFF] {
                let raw: Vec<u8> = (0..length)
                    .map(|i| seed.wrapping_mul(31).wrapping_add(i as u8 * 17))
                    .collect();
                let hex = decode(&raw).hex;
                assert_eq!(raw, encode_from_hex(&hex, length).unwrap());
            }
        }
    }

    #[test]
    fn test_encode_from_hex() {
        assert_eq!(vec![0xE8, 0x03], encode_from_hex("3e8", 2).unwrap());
        assert_eq!(vec![0x01, 0x00, 0x00, 0x00], encode_from_hex("0x1", 4).unwrap());
        assert_eq!(vec![0x01], encode_from_hex("0001", 1).unwrap());
        assert_eq!("000003E8", decode(&encode_from_hex("3e8", 4).unwrap()).hex);

        assert_eq!(
            Err(FormatError::Overflow {
                text: "123".into(),
                length: 1
            }),
            encode_from_hex("123", 1)
        );
        assert!(matches!(
            encode_from_hex("12G4", 2),
            Err(FormatError::InvalidHex {
                source: hex::FromHexError::InvalidHexCharacter { c: 'G', index: 2 },
                ..
            })
        ));
        assert!(matches!(encode_from_hex("12 4", 2), Err(FormatError::InvalidHex { .. })));
        assert!(matches!(encode_from_hex("0x", 2), Err(FormatError::MissingDigits { .. })));
        assert!(matches!(encode_from_hex("", 2), Err(FormatError::MissingDigits { .. })));
        assert!(matches!(encode_from_hex("12", 0), Err(FormatError::InvalidLength { .. })));
    }

    #[test]
    fn test_encode_from_float() {
        let raw = encode_from_float(1.0);
        assert_eq!(4, raw.len());
        assert_eq!("3F800000", decode(&raw).hex);
        assert_eq!(Some(-2.5), decode(&encode_from_float(-2.5)).float);
    }

    #[test]
    fn test_encode_integers() {
        assert_eq!(vec![0xFF], encode_from_unsigned(255, 1).unwrap());
        assert!(encode_from_unsigned(256, 1).is_err());
        assert_eq!(vec![0x80], encode_from_signed(-128, 1).unwrap());
        assert!(encode_from_signed(128, 1).is_err());
        assert_eq!(vec![0xFE, 0xFF], encode_from_signed(-2, 2).unwrap());
    }

    #[test]
    fn test_encode_value() {
        assert_eq!(vec![0xE8, 0x03], encode_value(DataType::UInt16, "1000", 1).unwrap());
        assert_eq!(
            vec![0x85, 0x01, 0x00, 0x00],
            encode_value(DataType::UInt32, "$NODEID+0x180", 5).unwrap()
        );
        assert_eq!(
            vec![0x85, 0x01, 0x00, 0x00],
            encode_value(DataType::UInt32, "0x180+$NODEID", 5).unwrap()
        );
        assert_eq!(vec![0xF6], encode_value(DataType::Int8, "-10", 1).unwrap());
        assert_eq!(vec![0x01], encode_value(DataType::Boolean, "1", 1).unwrap());
        assert_eq!(
            encode_from_float(1.5),
            encode_value(DataType::Real32, "1.5", 1).unwrap()
        );
        assert_eq!(b"abc".to_vec(), encode_value(DataType::VisibleString, "abc", 1).unwrap());
        assert_eq!(
            vec![0x01, 0xAB],
            encode_value(DataType::OctetString, "01 AB", 1).unwrap()
        );
        assert_eq!(Vec::<u8>::new(), encode_value(DataType::Domain, "", 1).unwrap());
        assert!(matches!(
            encode_value(DataType::OctetString, "01A", 1),
            Err(FormatError::InvalidHex {
                source: hex::FromHexError::OddLength,
                ..
            })
        ));

        let err = encode_value(DataType::UInt8, "300", 1).unwrap_err();
        assert_contains!(err.to_string(), "does not fit");
        assert!(matches!(encode_value(DataType::UInt16, "ten", 1), Err(FormatError::InvalidNumber { .. })));
        assert!(matches!(encode_value(DataType::Other(0x20), "1", 1), Err(FormatError::UnsupportedType { .. })));
    }

    #[test]
    fn test_format_value() {
        assert_eq!("1000", format_value(DataType::UInt16, &[0xE8, 0x03]));
        assert_eq!("-1", format_value(DataType::Int16, &[0xFF, 0xFF]));
        assert_eq!("1", format_value(DataType::Real32, &[0x00, 0x00, 0x80, 0x3F]));
        assert_eq!("name", format_value(DataType::VisibleString, b"name"));
        assert_eq!("01AB", format_value(DataType::OctetString, &[0x01, 0xAB]));
        // Length mismatch falls back to hex
        assert_eq!("0x03E8", format_value(DataType::UInt32, &[0xE8, 0x03]));
    }

    #[test]
    fn test_preferred_view() {
        assert_eq!(View::Unsigned, Data::preferred_view(DataType::UInt32));
        assert_eq!(View::Signed, Data::preferred_view(DataType::Int8));
        assert_eq!(View::Float, Data::preferred_view(DataType::Real32));
        assert_eq!(View::Hex, Data::preferred_view(DataType::OctetString));
    }
}
