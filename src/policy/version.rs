//! Strict `major.minor.patch` version model
//!
//! Only plain numeric triples are accepted. Pre-release and build metadata,
//! leading zeros and signs are rejected rather than coerced.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::config::{MAX_POLICY_NAME_LENGTH, MAX_VERSION_LENGTH, POLICY_NAME_PATTERN};

static POLICY_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(POLICY_NAME_PATTERN).expect("Invalid policy name pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionFormatError {
    #[error("version must not be empty")]
    Empty,

    #[error("invalid version '{0}': expected major.minor.patch")]
    Malformed(String),

    #[error("invalid {component} version component in '{version}'")]
    Component {
        component: &'static str,
        version: String,
    },

    #[error("version '{version}' exceeds {max} characters")]
    TooLong { version: String, max: usize },

    #[error("{component} version component in '{version}' is larger than {max}")]
    OutOfRange {
        component: &'static str,
        version: String,
        max: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyNameError {
    #[error("policy name must not be empty")]
    Empty,

    #[error("policy name '{name}' exceeds {max} characters")]
    TooLong { name: String, max: usize },

    #[error("policy name '{0}' may only contain letters, digits, '-' and '_'")]
    InvalidCharacters(String),
}

/// A release version of a policy.
///
/// Wraps [`semver::Version`] but is guaranteed to carry no pre-release or
/// build metadata, so ordering is purely numeric over (major, minor, patch).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(semver::Version);

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = VersionFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_version(s)
    }
}

/// Strip a single leading `v` from a user supplied version string.
///
/// - "v1.2.3" -> "1.2.3"
/// - "1.2.3" -> "1.2.3"
pub fn normalize_version(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

/// Parse a full `major.minor.patch` version.
///
/// Does NOT strip the `v` prefix (use `normalize_version` first if needed).
pub fn parse_version(version: &str) -> Result<Version, VersionFormatError> {
    if version.is_empty() {
        return Err(VersionFormatError::Empty);
    }

    // semver alone would accept "1.2.3-rc.1" and "1.2.3+build"
    if version.split('.').count() != 3 {
        return Err(VersionFormatError::Malformed(version.to_string()));
    }

    let parsed = semver::Version::parse(version)
        .map_err(|_| VersionFormatError::Malformed(version.to_string()))?;

    if !parsed.pre.is_empty() || !parsed.build.is_empty() {
        return Err(VersionFormatError::Malformed(version.to_string()));
    }

    Ok(Version(parsed))
}

/// Parse the leading major component, ignoring anything after it.
///
/// - "2" -> 2
/// - "2.1.0" -> 2
pub fn parse_major(version: &str) -> Result<u64, VersionFormatError> {
    let mut parts = version.split('.');
    parse_component(parts.next(), "major", version)
}

/// Parse the leading major and minor components, ignoring anything after them.
///
/// - "2.1" -> (2, 1)
/// - "2.1.7" -> (2, 1)
/// - "2" -> error (minor missing)
pub fn parse_major_minor(version: &str) -> Result<(u64, u64), VersionFormatError> {
    let mut parts = version.split('.');
    let major = parse_component(parts.next(), "major", version)?;
    let minor = parse_component(parts.next(), "minor", version)?;
    Ok((major, minor))
}

fn parse_component(
    part: Option<&str>,
    component: &'static str,
    version: &str,
) -> Result<u64, VersionFormatError> {
    let invalid = || VersionFormatError::Component {
        component,
        version: version.to_string(),
    };

    let part = part.filter(|p| !p.is_empty()).ok_or_else(invalid)?;

    // u64::from_str accepts a leading '+', and "01" would be silently coerced
    if !part.bytes().all(|b| b.is_ascii_digit()) || (part.len() > 1 && part.starts_with('0')) {
        return Err(invalid());
    }

    part.parse().map_err(|_| invalid())
}

/// Largest component a stored version may carry (SQLite INTEGER)
pub const MAX_STORED_COMPONENT: u64 = i64::MAX as u64;

/// Validate a version string for storage: bounded length, a strict triple
/// and components that fit the store's integer columns.
pub fn validate_version(version: &str) -> Result<Version, VersionFormatError> {
    if version.len() > MAX_VERSION_LENGTH {
        return Err(VersionFormatError::TooLong {
            version: version.to_string(),
            max: MAX_VERSION_LENGTH,
        });
    }

    let parsed = parse_version(version)?;
    let components = [
        ("major", parsed.major()),
        ("minor", parsed.minor()),
        ("patch", parsed.patch()),
    ];
    if let Some((component, _)) = components
        .into_iter()
        .find(|(_, value)| *value > MAX_STORED_COMPONENT)
    {
        return Err(VersionFormatError::OutOfRange {
            component,
            version: version.to_string(),
            max: MAX_STORED_COMPONENT,
        });
    }

    Ok(parsed)
}

pub fn validate_policy_name(name: &str) -> Result<(), PolicyNameError> {
    if name.is_empty() {
        return Err(PolicyNameError::Empty);
    }
    if name.len() > MAX_POLICY_NAME_LENGTH {
        return Err(PolicyNameError::TooLong {
            name: name.to_string(),
            max: MAX_POLICY_NAME_LENGTH,
        });
    }
    if !POLICY_NAME_RE.is_match(name) {
        return Err(PolicyNameError::InvalidCharacters(name.to_string()));
    }
    Ok(())
}

/// Find the highest version in a list, skipping entries that do not parse.
pub fn find_max_version<'a, I>(versions: I) -> Option<Version>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .filter_map(|v| parse_version(normalize_version(v)).ok())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0.0.0", (0, 0, 0))]
    #[case("1.2.3", (1, 2, 3))]
    #[case("10.20.30", (10, 20, 30))]
    #[case("2.0.18446744073709551615", (2, 0, u64::MAX))]
    fn parse_version_accepts_numeric_triples(#[case] input: &str, #[case] expected: (u64, u64, u64)) {
        let version = parse_version(input).unwrap();
        assert_eq!(
            (version.major(), version.minor(), version.patch()),
            expected
        );
        assert_eq!(version.to_string(), input);
    }

    #[rstest]
    #[case("")]
    #[case("1")]
    #[case("1.2")]
    #[case("1.2.3.4")]
    #[case("v1.2.3")] // prefix must be stripped by the caller
    #[case("1.2.3-rc.1")]
    #[case("1.2.3+build.5")]
    #[case("01.2.3")]
    #[case("1.02.3")]
    #[case("1.2.x")]
    #[case("-1.2.3")]
    #[case("1..3")]
    fn parse_version_rejects_other_shapes(#[case] input: &str) {
        assert!(parse_version(input).is_err(), "{input} should be rejected");
    }

    #[rstest]
    #[case("v1.2.3", "1.2.3")]
    #[case("1.2.3", "1.2.3")]
    #[case("vv1.2.3", "v1.2.3")]
    #[case("", "")]
    fn normalize_version_strips_one_prefix(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_version(input), expected);
    }

    #[rstest]
    #[case("2", Some(2))]
    #[case("2.1", Some(2))]
    #[case("2.x.y", Some(2))]
    #[case("", None)]
    #[case("x.1", None)]
    #[case("+2.1", None)]
    #[case(".1", None)]
    fn parse_major_returns_expected(#[case] input: &str, #[case] expected: Option<u64>) {
        assert_eq!(parse_major(input).ok(), expected);
    }

    #[rstest]
    #[case("2.1", Some((2, 1)))]
    #[case("2.1.9", Some((2, 1)))]
    #[case("2.1.x", Some((2, 1)))]
    #[case("2", None)]
    #[case("2.", None)]
    #[case("2.a", None)]
    #[case("a.1", None)]
    fn parse_major_minor_returns_expected(
        #[case] input: &str,
        #[case] expected: Option<(u64, u64)>,
    ) {
        assert_eq!(parse_major_minor(input).ok(), expected);
    }

    #[test]
    fn parse_major_minor_names_the_failing_component() {
        assert_eq!(
            parse_major_minor("3.beta"),
            Err(VersionFormatError::Component {
                component: "minor",
                version: "3.beta".to_string(),
            })
        );
    }

    #[test]
    fn versions_order_numerically() {
        let mut versions = vec![
            Version::new(1, 10, 0),
            Version::new(1, 2, 0),
            Version::new(2, 0, 0),
            Version::new(1, 2, 10),
            Version::new(1, 2, 9),
        ];
        versions.sort();

        assert_eq!(
            versions.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["1.2.0", "1.2.9", "1.2.10", "1.10.0", "2.0.0"]
        );
    }

    #[rstest]
    #[case(vec![], None)]
    #[case(vec!["1.0.0", "1.10.0", "1.9.0"], Some("1.10.0"))]
    #[case(vec!["v1.0.0", "2.0.0", "invalid"], Some("2.0.0"))]
    #[case(vec!["invalid", "1.0"], None)]
    fn find_max_version_returns_expected(
        #[case] versions: Vec<&str>,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(
            find_max_version(versions).map(|v| v.to_string()),
            expected.map(|s| s.to_string())
        );
    }

    #[rstest]
    #[case("rate-limit", true)]
    #[case("jwt_auth2", true)]
    #[case("", false)]
    #[case("has space", false)]
    #[case("slash/name", false)]
    fn validate_policy_name_returns_expected(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(validate_policy_name(name).is_ok(), valid);
    }

    #[test]
    fn validate_policy_name_rejects_overlong_names() {
        let name = "a".repeat(MAX_POLICY_NAME_LENGTH + 1);
        assert!(matches!(
            validate_policy_name(&name),
            Err(PolicyNameError::TooLong { .. })
        ));
    }

    #[rstest]
    #[case("1.0.9223372036854775808", "patch")]
    #[case("1.18446744073709551615.0", "minor")]
    #[case("9223372036854775808.0.0", "major")]
    fn validate_version_rejects_components_beyond_storage_range(
        #[case] version: &str,
        #[case] expected_component: &str,
    ) {
        match validate_version(version) {
            Err(VersionFormatError::OutOfRange { component, .. }) => {
                assert_eq!(component, expected_component)
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn validate_version_accepts_largest_storable_component() {
        let version = validate_version("1.0.9223372036854775807").unwrap();
        assert_eq!(version.patch(), MAX_STORED_COMPONENT);
    }

    #[test]
    fn validate_version_rejects_overlong_versions() {
        let version = format!("1.2.{}", "9".repeat(MAX_VERSION_LENGTH));
        assert!(matches!(
            validate_version(&version),
            Err(VersionFormatError::TooLong { .. })
        ));
    }
}
