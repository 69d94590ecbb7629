//! Checkpoint Sub-Part Versioning
//!
//! Per WIRE_FORMAT.md §2:
//! - Each point-to-point session negotiates one sub-part version
//! - Negotiated version = min(local max, peer max)
//! - A peer whose maximum is below our minimum cannot be synced
//!
//! The sub-part version is independent of the overall protocol version.
//! It gates which fields of each replicated record appear on the wire,
//! which is what allows rolling upgrades across a cluster.

use std::fmt;
use thiserror::Error;

/// A negotiated wire sub-part version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubPartVersion(u16);

/// Oldest sub-part version this build can still encode and decode.
pub const SUB_PART_VERSION_MIN: SubPartVersion = SubPartVersion(1);

/// Sub-part version this build emits when the peer supports it.
pub const SUB_PART_VERSION_CURRENT: SubPartVersion = SubPartVersion(5);

impl SubPartVersion {
    /// Create a version. Callers are expected to range-check via
    /// [`VersionRange::contains`] before trusting a peer-supplied value.
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Raw wire value.
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for SubPartVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The [min, max] sub-part range one side of a session supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    /// Lowest version this side can decode.
    pub min: SubPartVersion,
    /// Highest version this side can encode.
    pub max: SubPartVersion,
}

impl VersionRange {
    /// Range supported by this build.
    pub const SUPPORTED: VersionRange = VersionRange {
        min: SUB_PART_VERSION_MIN,
        max: SUB_PART_VERSION_CURRENT,
    };

    /// Create a range. Returns None when min > max.
    pub fn new(min: u16, max: u16) -> Option<Self> {
        if min > max {
            return None;
        }
        Some(Self {
            min: SubPartVersion(min),
            max: SubPartVersion(max),
        })
    }

    /// Whether a version falls inside this range.
    pub fn contains(&self, version: SubPartVersion) -> bool {
        version >= self.min && version <= self.max
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::SUPPORTED
    }
}

/// Version negotiation failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionError {
    /// The two advertised ranges do not overlap.
    #[error("version ranges do not overlap: local [{local_min}, {local_max}], peer [{peer_min}, {peer_max}]")]
    Incompatible {
        local_min: u16,
        local_max: u16,
        peer_min: u16,
        peer_max: u16,
    },
}

/// Negotiate the session version from both advertised ranges.
///
/// Per WIRE_FORMAT.md §2.3 the result is min(local max, peer max). The
/// session fails when that value falls below either side's minimum.
pub fn negotiate(local: VersionRange, peer: VersionRange) -> Result<SubPartVersion, VersionError> {
    let candidate = local.max.min(peer.max);
    if candidate < local.min || candidate < peer.min {
        return Err(VersionError::Incompatible {
            local_min: local.min.get(),
            local_max: local.max.get(),
            peer_min: peer.min.get(),
            peer_max: peer.max.get(),
        });
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_takes_lower_maximum() {
        let local = VersionRange::new(1, 5).unwrap();
        let peer = VersionRange::new(1, 3).unwrap();

        assert_eq!(negotiate(local, peer), Ok(SubPartVersion::new(3)));
        assert_eq!(negotiate(peer, local), Ok(SubPartVersion::new(3)));
    }

    #[test]
    fn test_negotiate_equal_ranges() {
        let range = VersionRange::SUPPORTED;
        assert_eq!(negotiate(range, range), Ok(SUB_PART_VERSION_CURRENT));
    }

    #[test]
    fn test_negotiate_fails_below_local_minimum() {
        let local = VersionRange::new(4, 5).unwrap();
        let peer = VersionRange::new(1, 3).unwrap();

        assert!(negotiate(local, peer).is_err());
    }

    #[test]
    fn test_negotiate_fails_below_peer_minimum() {
        let local = VersionRange::new(1, 3).unwrap();
        let peer = VersionRange::new(4, 6).unwrap();

        assert!(negotiate(local, peer).is_err());
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        assert!(VersionRange::new(5, 1).is_none());
    }

    #[test]
    fn test_range_contains() {
        let range = VersionRange::new(2, 4).unwrap();
        assert!(!range.contains(SubPartVersion::new(1)));
        assert!(range.contains(SubPartVersion::new(2)));
        assert!(range.contains(SubPartVersion::new(4)));
        assert!(!range.contains(SubPartVersion::new(5)));
    }
}
