//! Object Definitions
//!

/// A container for the address of a subobject
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectId {
    /// Object index
    pub index: u16,
    /// Sub index
    pub sub: u8,
}

impl ObjectId {
    /// Create a new object address
    pub const fn new(index: u16, sub: u8) -> Self {
        Self { index, sub }
    }
}

impl core::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:04X} 0x{:02X}", self.index, self.sub)
    }
}

/// Object Code value
///
/// Defines the type of an object in an EDS/DCF file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectCode {
    /// An empty object
    Null = 0,
    /// A large chunk of data
    Domain = 2,
    /// An object which has a single sub object
    #[default]
    Var = 7,
    /// An array of sub-objects all with the same data type
    Array = 8,
    /// A collection of sub-objects with varying types
    Record = 9,
}

impl TryFrom<u8> for ObjectCode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ObjectCode::Null),
            2 => Ok(ObjectCode::Domain),
            7 => Ok(ObjectCode::Var),
            8 => Ok(ObjectCode::Array),
            9 => Ok(ObjectCode::Record),
            _ => Err(()),
        }
    }
}

/// Access type enum
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AccessType {
    /// Read-only
    #[default]
    Ro,
    /// Write-only
    Wo,
    /// Read-write
    Rw,
    /// Read-only, and also will never be changed, even internally by the device
    Const,
}

impl AccessType {
    /// Returns true if an object with this access type can be read
    pub fn is_readable(&self) -> bool {
        matches!(self, AccessType::Ro | AccessType::Rw | AccessType::Const)
    }

    /// Returns true if an object with this access type can be written
    pub fn is_writable(&self) -> bool {
        matches!(self, AccessType::Rw | AccessType::Wo)
    }

    /// The keyword used for this access type in EDS/DCF files
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Ro => "ro",
            AccessType::Wo => "wo",
            AccessType::Rw => "rw",
            AccessType::Const => "const",
        }
    }
}

/// Indicate the type of data stored in an object
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum DataType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    #[default]
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Real32,
    Real64,
    VisibleString,
    OctetString,
    UnicodeString,
    Domain,
    Other(u16),
}

impl From<u16> for DataType {
    fn from(value: u16) -> Self {
        use DataType::*;
        match value {
            0x1 => Boolean,
            0x2 => Int8,
            0x3 => Int16,
            0x4 => Int32,
            0x5 => UInt8,
            0x6 => UInt16,
            0x7 => UInt32,
            0x8 => Real32,
            0x9 => VisibleString,
            0xa => OctetString,
            0xb => UnicodeString,
            0xf => Domain,
            0x11 => Real64,
            0x15 => Int64,
            0x1b => UInt64,
            _ => Other(value),
        }
    }
}

impl From<DataType> for u16 {
    fn from(value: DataType) -> Self {
        use DataType::*;
        match value {
            Boolean => 0x1,
            Int8 => 0x2,
            Int16 => 0x3,
            Int32 => 0x4,
            UInt8 => 0x5,
            UInt16 => 0x6,
            UInt32 => 0x7,
            Real32 => 0x8,
            VisibleString => 0x9,
            OctetString => 0xa,
            UnicodeString => 0xb,
            Domain => 0xf,
            Real64 => 0x11,
            Int64 => 0x15,
            UInt64 => 0x1b,
            Other(code) => code,
        }
    }
}

impl DataType {
    /// Returns true if data type is one of the string types
    pub fn is_str(&self) -> bool {
        matches!(
            self,
            Self::VisibleString | Self::OctetString | Self::UnicodeString
        )
    }

    /// Returns true for the unsigned integer types (including boolean)
    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            Self::Boolean | Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64
        )
    }

    /// Returns true for the signed integer types
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// Returns true for the floating point types
    pub fn is_float(&self) -> bool {
        matches!(self, Self::Real32 | Self::Real64)
    }

    /// The size in bytes of a fixed size type, or None for variable length types
    pub fn size(&self) -> Option<usize> {
        use DataType::*;
        match self {
            Boolean | Int8 | UInt8 => Some(1),
            Int16 | UInt16 => Some(2),
            Int32 | UInt32 | Real32 => Some(4),
            Int64 | UInt64 | Real64 => Some(8),
            VisibleString | OctetString | UnicodeString | Domain | Other(_) => None,
        }
    }
}
