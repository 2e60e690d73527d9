//! Server version numbers.

use std::fmt;

/// A four-part server version: major, minor, build, revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ServerVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Build number.
    pub build: u32,
    /// Revision.
    pub revision: u32,
}

impl ServerVersion {
    /// Create a version from its parts.
    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// The version as a tuple.
    pub fn as_tuple(&self) -> (u32, u32, u32, u32) {
        (self.major, self.minor, self.build, self.revision)
    }

    /// Check if this version is at least the given major version.
    pub fn at_least_major(&self, major: u32) -> bool {
        self.major >= major
    }
}

impl From<(u32, u32, u32, u32)> for ServerVersion {
    fn from((major, minor, build, revision): (u32, u32, u32, u32)) -> Self {
        Self::new(major, minor, build, revision)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        let v2014 = ServerVersion::new(12, 0, 2000, 8);
        let v2016 = ServerVersion::new(13, 0, 1601, 5);
        assert!(v2014 < v2016);
        assert!(ServerVersion::new(12, 0, 2000, 9) > v2014);
        assert!(v2016.at_least_major(13));
        assert!(!v2014.at_least_major(13));
    }

    #[test]
    fn test_display_and_tuple() {
        let v = ServerVersion::from((12, 0, 2000, 8));
        assert_eq!(v.to_string(), "12.0.2000.8");
        assert_eq!(v.as_tuple(), (12, 0, 2000, 8));
    }
}
