//! SQL Server version banners and the features they unlock.

use std::sync::LazyLock;

use regex_lite::Regex;
use sqlweave_core::ServerVersion;

/// SQL Server 2000.
pub const MS_2000_VERSION: u32 = 8;
/// SQL Server 2005.
pub const MS_2005_VERSION: u32 = 9;
/// SQL Server 2008.
pub const MS_2008_VERSION: u32 = 10;
/// SQL Server 2012.
pub const MS_2012_VERSION: u32 = 11;
/// SQL Server 2014.
pub const MS_2014_VERSION: u32 = 12;
/// SQL Server 2016.
pub const MS_2016_VERSION: u32 = 13;
/// SQL Server 2017.
pub const MS_2017_VERSION: u32 = 14;
/// SQL Server 2019.
pub const MS_2019_VERSION: u32 = 15;
/// SQL Server 2022.
pub const MS_2022_VERSION: u32 = 16;

/// Query returning the server banner.
pub const VERSION_QUERY: &str = "select @@version";

static BANNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Microsoft .*? - (\d+)\.(\d+)\.(\d+)\.(\d+)").expect("banner pattern is valid")
});

/// Parse the `@@version` banner.
///
/// The banner must start with `Microsoft`, followed by free text, ` - ` and
/// a four-part version number. Anything else yields `None`.
///
/// ```rust
/// use sqlweave_mssql::version::parse_version_banner;
///
/// let banner = "Microsoft SQL Server 2014 - 12.0.2000.8 (X64) \n\tFeb 20 2014 20:04:26";
/// assert_eq!(parse_version_banner(banner).map(|v| v.as_tuple()), Some((12, 0, 2000, 8)));
/// assert_eq!(parse_version_banner("unknown"), None);
/// ```
pub fn parse_version_banner(banner: &str) -> Option<ServerVersion> {
    let caps = BANNER.captures(banner)?;
    let part = |i: usize| caps.get(i)?.as_str().parse::<u32>().ok();
    Some(ServerVersion::new(part(1)?, part(2)?, part(3)?, part(4)?))
}

/// Server features gated on the version.
///
/// An unknown version disables everything, so callers fall back to the most
/// conservative SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MssqlCapabilities {
    version: Option<ServerVersion>,
}

impl MssqlCapabilities {
    /// Capabilities of a server with the given version.
    pub fn from_version(version: Option<ServerVersion>) -> Self {
        Self { version }
    }

    /// The detected version.
    pub fn version(&self) -> Option<ServerVersion> {
        self.version
    }

    fn at_least(&self, major: u32) -> bool {
        self.version.is_some_and(|v| v.at_least_major(major))
    }

    /// `OFFSET ... FETCH NEXT ... ROWS ONLY` pagination.
    pub fn supports_offset_fetch(&self) -> bool {
        self.at_least(MS_2012_VERSION)
    }

    /// `CREATE SEQUENCE` and `NEXT VALUE FOR`.
    pub fn supports_sequences(&self) -> bool {
        self.at_least(MS_2012_VERSION)
    }

    /// `INSERT ... VALUES (...), (...)`.
    pub fn supports_multivalues_insert(&self) -> bool {
        self.at_least(MS_2008_VERSION)
    }

    /// `OPENJSON`, `JSON_VALUE` and friends.
    pub fn supports_native_json(&self) -> bool {
        self.at_least(MS_2016_VERSION)
    }

    /// Marketing name of the server release.
    pub fn product_name(&self) -> &'static str {
        match self.version.map(|v| v.major) {
            Some(MS_2000_VERSION) => "SQL Server 2000",
            Some(MS_2005_VERSION) => "SQL Server 2005",
            Some(MS_2008_VERSION) => "SQL Server 2008",
            Some(MS_2012_VERSION) => "SQL Server 2012",
            Some(MS_2014_VERSION) => "SQL Server 2014",
            Some(MS_2016_VERSION) => "SQL Server 2016",
            Some(MS_2017_VERSION) => "SQL Server 2017",
            Some(MS_2019_VERSION) => "SQL Server 2019",
            Some(MS_2022_VERSION) => "SQL Server 2022",
            Some(_) => "SQL Server",
            None => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_banner() {
        let v = parse_version_banner("Microsoft SQL Server ... - 12.0.2000.8").unwrap();
        assert_eq!(v.as_tuple(), (12, 0, 2000, 8));
    }

    #[test]
    fn test_parse_real_banners() {
        let azure = "Microsoft SQL Azure (RTM) - 12.0.2000.8 \n\tJul 31 2020 08:26:29 \n\tCopyright (C) 2019 Microsoft Corporation\n";
        assert_eq!(
            parse_version_banner(azure).map(|v| v.as_tuple()),
            Some((12, 0, 2000, 8))
        );

        let linux = "Microsoft SQL Server 2019 (RTM-CU18) (KB5017593) - 15.0.4261.1 (X64) \n\tSep 12 2022 15:07:06";
        assert_eq!(
            parse_version_banner(linux).map(|v| v.as_tuple()),
            Some((15, 0, 4261, 1))
        );
    }

    #[test]
    fn test_parse_non_matching() {
        assert_eq!(parse_version_banner("unknown"), None);
        assert_eq!(parse_version_banner(""), None);
        // Must start with the vendor name.
        assert_eq!(
            parse_version_banner("Adaptive Server Enterprise - 16.0.3.7"),
            None
        );
        assert_eq!(parse_version_banner("Microsoft SQL Server - 12.0.2000"), None);
        assert_eq!(
            parse_version_banner("Microsoft SQL Server - 99999999999.0.1.1"),
            None
        );
    }

    #[test]
    fn test_capabilities() {
        let caps = MssqlCapabilities::from_version(Some(ServerVersion::new(13, 0, 1601, 5)));
        assert!(caps.supports_offset_fetch());
        assert!(caps.supports_native_json());
        assert!(caps.supports_multivalues_insert());
        assert_eq!(caps.product_name(), "SQL Server 2016");

        let caps = MssqlCapabilities::from_version(Some(ServerVersion::new(10, 50, 1600, 1)));
        assert!(caps.supports_multivalues_insert());
        assert!(!caps.supports_offset_fetch());
        assert!(!caps.supports_sequences());
    }

    #[test]
    fn test_unknown_version_is_conservative() {
        let caps = MssqlCapabilities::from_version(None);
        assert!(!caps.supports_offset_fetch());
        assert!(!caps.supports_multivalues_insert());
        assert!(!caps.supports_native_json());
        assert_eq!(caps.product_name(), "unknown");
        assert_eq!(caps.version(), None);
    }
}
