//! Device, channel and scan types.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ModelError;

/// Number of hexadecimal digits in a device id.
pub const DEVICE_ID_DIGITS: usize = 8;

/// Program count recorded for every scanned channel entry.
///
/// Each detected program becomes its own entry, so the count is always one.
pub const PROGRAMS_PER_ENTRY: u32 = 1;

// ============================================================================
// Device identification
// ============================================================================

/// HDHomeRun device id (8 hexadecimal digits, e.g. `103FD2C1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(u32);

impl DeviceId {
    /// Create a device id from its numeric value.
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Numeric value of the id, as expected by the tuner library.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl FromStr for DeviceId {
    type Err = ModelError;

    /// Parse a fixed-width id. Surrounding whitespace is not trimmed.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DEVICE_ID_DIGITS || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ModelError::InvalidDeviceId(s.to_string()));
        }
        u32::from_str_radix(s, 16)
            .map(DeviceId)
            .map_err(|_| ModelError::InvalidDeviceId(s.to_string()))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

// ============================================================================
// Tune requests
// ============================================================================

/// A channel or frequency string accepted by the tuner, e.g. `5.1`,
/// `609 000000` or `5-1`.
///
/// Only ASCII digits, `.`, space and `-` are allowed so that nothing
/// else is ever handed to the device control protocol. The text is kept
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TuneSpec(String);

impl TuneSpec {
    /// Validate and wrap a tune string.
    pub fn parse(s: &str) -> Result<Self, ModelError> {
        if is_valid_tune_spec(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ModelError::InvalidTuneSpec(s.to_string()))
        }
    }

    /// The tune string exactly as entered.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TuneSpec {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TuneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_valid_tune_spec(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || b == b'.' || b == b' ' || b == b'-')
}

// ============================================================================
// Channel maps
// ============================================================================

/// Channel map used to drive a scan.
///
/// The estimated channel count only scales the progress bar; the real
/// number of candidate frequencies is decided by the tuner library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
pub enum ChannelMap {
    /// US over-the-air (ATSC).
    #[default]
    #[serde(rename = "us-bcast")]
    UsBroadcast,
    /// US cable (QAM).
    #[serde(rename = "us-cable")]
    UsCable,
    /// European over-the-air (DVB-T).
    #[serde(rename = "eu-bcast")]
    EuBroadcast,
    /// European cable (DVB-C).
    #[serde(rename = "eu-cable")]
    EuCable,
    /// Australian over-the-air (DVB-T).
    #[serde(rename = "au-bcast")]
    AuBroadcast,
    /// Australian cable (DVB-C).
    #[serde(rename = "au-cable")]
    AuCable,
}

impl ChannelMap {
    /// Every supported map, in menu order.
    pub const ALL: [ChannelMap; 6] = [
        ChannelMap::UsBroadcast,
        ChannelMap::UsCable,
        ChannelMap::EuBroadcast,
        ChannelMap::EuCable,
        ChannelMap::AuBroadcast,
        ChannelMap::AuCable,
    ];

    /// Name understood by the tuner library's channel scan.
    pub fn scan_name(self) -> &'static str {
        match self {
            ChannelMap::UsBroadcast => "us-bcast",
            ChannelMap::UsCable => "us-cable",
            ChannelMap::EuBroadcast => "eu-bcast",
            ChannelMap::EuCable => "eu-cable",
            ChannelMap::AuBroadcast => "au-bcast",
            ChannelMap::AuCable => "au-cable",
        }
    }

    /// Human readable name.
    pub fn display_name(self) -> &'static str {
        match self {
            ChannelMap::UsBroadcast => "US Broadcast",
            ChannelMap::UsCable => "US Cable",
            ChannelMap::EuBroadcast => "EU Broadcast",
            ChannelMap::EuCable => "EU Cable",
            ChannelMap::AuBroadcast => "AU Broadcast",
            ChannelMap::AuCable => "AU Cable",
        }
    }

    /// Rough number of frequencies the scan will visit.
    pub fn estimated_channels(self) -> u32 {
        match self {
            ChannelMap::UsBroadcast => 69,
            ChannelMap::UsCable => 135,
            ChannelMap::EuBroadcast => 60,
            ChannelMap::EuCable => 100,
            ChannelMap::AuBroadcast => 50,
            ChannelMap::AuCable => 100,
        }
    }
}

impl FromStr for ChannelMap {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChannelMap::ALL
            .iter()
            .copied()
            .find(|map| map.scan_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ModelError::UnknownChannelMap(s.to_string()))
    }
}

impl fmt::Display for ChannelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ============================================================================
// Scan results
// ============================================================================

/// One program reported by a detect step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetectedProgram {
    /// Virtual channel or program number; empty when the device gave none.
    pub identifier: String,
    /// Station name; empty when not broadcast.
    pub name: String,
}

impl DetectedProgram {
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
        }
    }
}

/// A virtual channel discovered during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedChannel {
    /// Channel identifier, e.g. `5.1`.
    pub channel: String,
    /// Center frequency in Hz.
    pub frequency: u32,
    /// Programs represented by this entry.
    pub program_count: u32,
    /// Station name, if broadcast.
    pub name: Option<String>,
}

impl ScannedChannel {
    /// Build an entry from a detected program.
    ///
    /// Returns `None` for programs without an identifier.
    pub fn from_program(program: &DetectedProgram, frequency: u32) -> Option<Self> {
        if program.identifier.is_empty() {
            return None;
        }
        Some(Self {
            channel: program.identifier.clone(),
            frequency,
            program_count: PROGRAMS_PER_ENTRY,
            name: (!program.name.is_empty()).then(|| program.name.clone()),
        })
    }
}

/// A tunable channel offered to the user after a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedChannel {
    /// Channel identifier passed to the tuner.
    pub channel: String,
    /// Station name, if known.
    pub name: Option<String>,
    /// Center frequency in Hz.
    pub frequency: u32,
}

impl From<&ScannedChannel> for SavedChannel {
    fn from(ch: &ScannedChannel) -> Self {
        Self {
            channel: ch.channel.clone(),
            name: ch.name.clone(),
            frequency: ch.frequency,
        }
    }
}

impl fmt::Display for SavedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} - {}", self.channel, name),
            None => write!(f, "Channel {}", self.channel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_accepts_eight_hex_digits() {
        let id: DeviceId = "103FD2C1".parse().unwrap();
        assert_eq!(id.as_u32(), 0x103F_D2C1);
        assert_eq!(id.to_string(), "103FD2C1");

        let lower: DeviceId = "103fd2c1".parse().unwrap();
        assert_eq!(lower, id);
    }

    #[test]
    fn test_device_id_rejects_malformed() {
        for bad in ["xyz", "", "103FD2C1 ", " 103FD2C1", "103FD2C", "103FD2C1A", "103FD2G1"] {
            assert_eq!(
                bad.parse::<DeviceId>(),
                Err(ModelError::InvalidDeviceId(bad.to_string())),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_tune_spec_validation() {
        for good in ["5.1", "609 000000", "5-1", "36"] {
            let spec = TuneSpec::parse(good).unwrap();
            assert_eq!(spec.as_str(), good);
        }
        for bad in ["", "abc", "5.1;rm -rf", "auto:609000000", "5.1\n"] {
            assert!(TuneSpec::parse(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_channel_map_names() {
        for map in ChannelMap::ALL {
            assert_eq!(map.scan_name().parse::<ChannelMap>().unwrap(), map);
            assert!(map.estimated_channels() > 0);
        }
        assert_eq!("US-CABLE".parse::<ChannelMap>().unwrap(), ChannelMap::UsCable);
        assert!("jp-bcast".parse::<ChannelMap>().is_err());
        assert_eq!(ChannelMap::default(), ChannelMap::UsBroadcast);
    }

    #[test]
    fn test_scanned_channel_skips_empty_identifier() {
        let empty = DetectedProgram::new("", "Data");
        assert!(ScannedChannel::from_program(&empty, 500_000_000).is_none());

        let ch = ScannedChannel::from_program(&DetectedProgram::new("5.1", ""), 500_000_000).unwrap();
        assert_eq!(ch.channel, "5.1");
        assert_eq!(ch.frequency, 500_000_000);
        assert_eq!(ch.program_count, 1);
        assert_eq!(ch.name, None);
    }

    #[test]
    fn test_saved_channel_display() {
        let cbs = ScannedChannel {
            channel: "5.1".into(),
            frequency: 500_000_000,
            program_count: 1,
            name: Some("CBS".into()),
        };
        let unnamed = ScannedChannel {
            channel: "7.1".into(),
            frequency: 600_000_000,
            program_count: 1,
            name: None,
        };

        assert_eq!(SavedChannel::from(&cbs).to_string(), "5.1 - CBS");
        assert_eq!(SavedChannel::from(&unnamed).to_string(), "Channel 7.1");
        assert_eq!(SavedChannel::from(&unnamed).frequency, 600_000_000);
    }
}
