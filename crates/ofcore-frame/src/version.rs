use std::ops::RangeInclusive;

/// OpenFlow 1.0 wire version.
pub const OFP_1_0: u8 = 0x01;
/// OpenFlow 1.1 wire version.
pub const OFP_1_1: u8 = 0x02;
/// OpenFlow 1.2 wire version.
pub const OFP_1_2: u8 = 0x03;
/// OpenFlow 1.3 wire version.
pub const OFP_1_3: u8 = 0x04;
/// OpenFlow 1.4 wire version.
pub const OFP_1_4: u8 = 0x05;
/// OpenFlow 1.5 wire version.
pub const OFP_1_5: u8 = 0x06;

/// Every version byte the framer recognizes, whether or not a codec exists for it.
pub const KNOWN_VERSIONS: RangeInclusive<u8> = OFP_1_0..=OFP_1_5;

/// Whether `version` is a recognized OpenFlow wire version.
pub fn is_known_version(version: u8) -> bool {
    KNOWN_VERSIONS.contains(&version)
}

/// Render a version byte the way event names spell it, e.g. `v0x04`.
pub fn version_label(version: u8) -> String {
    format!("v0x{version:02x}")
}
