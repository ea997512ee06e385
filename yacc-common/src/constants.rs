//! Constants defining standard object and special values
//!
//!

/// Object indices for standard objects
pub mod object_ids {
    /// The Device Type object index
    pub const DEVICE_TYPE: u16 = 0x1000;
    /// The Error Register object index
    pub const ERROR_REGISTER: u16 = 0x1001;
    /// Save objects command object index
    pub const SAVE_OBJECTS: u16 = 0x1010;
    /// Restore default parameters command object index
    pub const RESTORE_DEFAULTS: u16 = 0x1011;
    /// The heartbeat producer time object index
    pub const HEARTBEAT_PRODUCER_TIME: u16 = 0x1017;
    /// The identity object index
    pub const IDENTITY: u16 = 0x1018;
    /// First RPDO communication parameter object
    pub const RPDO_COMM_BASE: u16 = 0x1400;
    /// First RPDO mapping parameter object
    pub const RPDO_MAPPING_BASE: u16 = 0x1600;
    /// First TPDO communication parameter object
    pub const TPDO_COMM_BASE: u16 = 0x1800;
    /// First TPDO mapping parameter object
    pub const TPDO_MAPPING_BASE: u16 = 0x1A00;
}

/// Special values used to access standard objects
pub mod values {
    /// Sub index of 0x1010/0x1011 which saves/restores all parameters
    pub const ALL_PARAMETERS_SUB: u8 = 1;
    /// Signature written to 0x1010 to trigger parameter storage ("save" in wire order)
    pub const SAVE_SIGNATURE: [u8; 4] = *b"save";
    /// Signature written to 0x1011 to restore default parameters ("load" in wire order)
    pub const RESTORE_SIGNATURE: [u8; 4] = *b"load";
    /// Sub index of the COB-ID in a PDO communication parameter object
    pub const PDO_COB_ID_SUB: u8 = 1;
    /// Sub index holding the number of mapped objects in a PDO mapping parameter object
    pub const PDO_MAPPING_COUNT_SUB: u8 = 0;
    /// Bit 31 of a PDO COB-ID; when set, the PDO is not valid (disabled)
    pub const PDO_COB_ID_INVALID: u32 = 1 << 31;
}
