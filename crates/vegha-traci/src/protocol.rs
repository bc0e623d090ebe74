//! TraCI protocol constants used by the adapter.
//!
//! Only the subset of the protocol needed to stream vehicles and signals is
//! listed. Values match SUMO's `TraCIConstants`.

/// Command identifiers.
pub mod command {
    /// Query API and simulator version.
    pub const GET_VERSION: u8 = 0x00;
    /// Advance the simulation.
    pub const SIMULATION_STEP: u8 = 0x02;
    /// End the session.
    pub const CLOSE: u8 = 0x7F;
    /// Traffic light variable query.
    pub const GET_TL_VARIABLE: u8 = 0xA2;
    /// Lane variable query.
    pub const GET_LANE_VARIABLE: u8 = 0xA3;
    /// Vehicle variable query.
    pub const GET_VEHICLE_VARIABLE: u8 = 0xA4;
    /// Simulation variable query.
    pub const GET_SIM_VARIABLE: u8 = 0xAB;

    /// Offset between a get command and its response.
    pub const RESPONSE_OFFSET: u8 = 0x10;
}

/// Variable identifiers.
pub mod variable {
    /// List of object IDs (any domain).
    pub const ID_LIST: u8 = 0x00;
    /// Traffic light red/yellow/green state string.
    pub const TL_RED_YELLOW_GREEN_STATE: u8 = 0x20;
    /// Traffic light controlled links.
    pub const TL_CONTROLLED_LINKS: u8 = 0x27;
    /// Vehicle speed in m/s.
    pub const SPEED: u8 = 0x40;
    /// Vehicle 2D position.
    pub const POSITION: u8 = 0x42;
    /// Vehicle angle in degrees.
    pub const ANGLE: u8 = 0x43;
    /// Lane shape polyline.
    pub const SHAPE: u8 = 0x4E;
    /// Vehicle type ID.
    pub const TYPE: u8 = 0x4F;
    /// Network bounding box.
    pub const NET_BOUNDING_BOX: u8 = 0x7C;
    /// Coordinate conversion.
    pub const POSITION_CONVERSION: u8 = 0x82;
}

/// Type tags of the storage format.
pub mod tag {
    /// Longitude/latitude pair.
    pub const POSITION_LON_LAT: u8 = 0x00;
    /// Network x/y pair.
    pub const POSITION_2D: u8 = 0x01;
    /// Polyline.
    pub const POLYGON: u8 = 0x06;
    /// Unsigned byte.
    pub const UBYTE: u8 = 0x07;
    /// 32-bit signed integer.
    pub const INTEGER: u8 = 0x09;
    /// 64-bit float.
    pub const DOUBLE: u8 = 0x0B;
    /// Length-prefixed string.
    pub const STRING: u8 = 0x0C;
    /// Count-prefixed list of strings.
    pub const STRING_LIST: u8 = 0x0E;
    /// Count-prefixed list of typed values.
    pub const COMPOUND: u8 = 0x0F;
}

/// Status result codes.
pub mod status {
    /// Command succeeded.
    pub const OK: u8 = 0x00;
    /// Command is not implemented by the server.
    pub const NOT_IMPLEMENTED: u8 = 0x01;
    /// Command failed.
    pub const ERR: u8 = 0xFF;
}
