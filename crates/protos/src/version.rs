use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Version of the opaque application payload, travels independent
/// of the protocol version.
pub type PayloadVersion = u16;

/// Ordered protocol revisions. A peer always encodes for the oldest
/// of its own version and the version its counterpart reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RaftVersion {
    /// Fixed big-endian layout, no leader address exchange and
    /// no forced snapshot hint.
    Helium = 3,
    /// First protobuf envelope, adds `force_install_snapshot`.
    Fluorine = 4,
    /// Adds `needs_leader_address` / `leader_address`.
    Argon = 5,
}

impl RaftVersion {
    pub const CURRENT: RaftVersion = RaftVersion::Argon;
    pub const OLDEST: RaftVersion = RaftVersion::Helium;
    pub const ALL: [RaftVersion; 3] = [RaftVersion::Helium, RaftVersion::Fluorine, RaftVersion::Argon];

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            3 => Some(RaftVersion::Helium),
            4 => Some(RaftVersion::Fluorine),
            5 => Some(RaftVersion::Argon),
            _ => None,
        }
    }

    pub fn previous(self) -> Option<Self> {
        match self {
            RaftVersion::Helium => None,
            RaftVersion::Fluorine => Some(RaftVersion::Helium),
            RaftVersion::Argon => Some(RaftVersion::Fluorine),
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            RaftVersion::Helium => Some(RaftVersion::Fluorine),
            RaftVersion::Fluorine => Some(RaftVersion::Argon),
            RaftVersion::Argon => None,
        }
    }

    /// The version to speak with a peer that tagged its traffic with `reported`.
    /// Newer (unknown) tags fall back to our own version.
    pub fn negotiate(self, reported: u8) -> RaftVersion {
        if reported >= RaftVersion::CURRENT.as_u8() {
            return self;
        }
        match RaftVersion::from_u8(reported) {
            Some(version) => self.min(version),
            None => RaftVersion::OLDEST,
        }
    }

    #[inline]
    pub fn supports_force_install_snapshot(self) -> bool {
        self >= RaftVersion::Fluorine
    }

    #[inline]
    pub fn supports_leader_address(self) -> bool {
        self >= RaftVersion::Argon
    }
}

impl Default for RaftVersion {
    fn default() -> Self {
        RaftVersion::CURRENT
    }
}

impl Display for RaftVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            RaftVersion::Helium => "Helium",
            RaftVersion::Fluorine => "Fluorine",
            RaftVersion::Argon => "Argon",
        };
        write!(f, "{}({})", name, self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::RaftVersion;

    #[test]
    fn test_negotiate_version() {
        let current = RaftVersion::CURRENT;
        assert_eq!(current.negotiate(RaftVersion::Helium.as_u8()), RaftVersion::Helium);
        assert_eq!(current.negotiate(RaftVersion::Fluorine.as_u8()), RaftVersion::Fluorine);
        // a newer build than us is spoken to in our own version.
        assert_eq!(current.negotiate(42), current);
        assert_eq!(RaftVersion::Fluorine.negotiate(RaftVersion::Argon.as_u8()), RaftVersion::Fluorine);
        // garbage below the oldest known tag degrades to the oldest one.
        assert_eq!(current.negotiate(1), RaftVersion::Helium);
    }

    #[test]
    fn test_version_chain() {
        let mut version = RaftVersion::OLDEST;
        let mut chain = vec![version];
        while let Some(next) = version.next() {
            assert_eq!(next.previous(), Some(version));
            chain.push(next);
            version = next;
        }
        assert_eq!(chain, RaftVersion::ALL.to_vec());
        assert_eq!(version, RaftVersion::CURRENT);
    }
}
