//! Image build arguments derived from a version string.
//!
//! Versions are written `<semver>-<build number>`, e.g. `4.5.0-2601`. The
//! resolver is pure: identical options always yield the same ordered list.

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};
use crate::options::ProviderOptions;

/// Flavor assigned to versions newer than every entry in the table.
pub const LATEST_FLAVOR: &str = "spock";

// Release line (major, minor) to flavor.
const FLAVORS: &[((u32, u32), &str)] = &[
    ((4, 1), "sherlock"),
    ((4, 5), "watson"),
    ((4, 6), "watson"),
    ((4, 7), "spock"),
    ((5, 0), "spock"),
];

// Oldest release line with a known flavor.
const OLDEST_KNOWN: (u32, u32) = (4, 1);

/// A single `--build-arg` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArg {
    /// Argument name.
    pub name: String,

    /// Argument value.
    pub value: String,
}

impl BuildArg {
    /// Creates a build argument.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Splits `<version>-<build>` into its two segments.
///
/// # Errors
///
/// Returns [`ProvisionError::InvalidVersionFormat`] when the build number
/// segment is missing or empty.
pub fn split_version(version: &str) -> Result<(&str, &str)> {
    let mut parts = version.split('-');
    let ver = parts.next().unwrap_or_default();
    match parts.next() {
        Some(build) if !ver.is_empty() && !build.is_empty() => Ok((ver, build)),
        _ => Err(ProvisionError::InvalidVersionFormat(version.to_string())),
    }
}

/// Maps a version to its product flavor.
///
/// Unknown versions newer than the table resolve to [`LATEST_FLAVOR`].
/// Versions older than the oldest known line are rejected rather than
/// mislabelled.
///
/// # Examples
///
/// ```
/// use topokit_orchestrator::build_args::resolve_flavor;
///
/// assert_eq!(resolve_flavor("4.5.0").unwrap(), "watson");
/// assert_eq!(resolve_flavor("4.7.1").unwrap(), "spock");
/// assert_eq!(resolve_flavor("9.9.9").unwrap(), "spock");
/// assert!(resolve_flavor("3.0.1").is_err());
/// ```
pub fn resolve_flavor(version: &str) -> Result<&'static str> {
    let Some(release) = major_minor(version) else {
        return Ok(LATEST_FLAVOR);
    };

    if let Some((_, flavor)) = FLAVORS.iter().find(|(line, _)| *line == release) {
        return Ok(flavor);
    }
    if release < OLDEST_KNOWN {
        return Err(ProvisionError::UnsupportedVersion(version.to_string()));
    }
    Ok(LATEST_FLAVOR)
}

fn major_minor(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.split('.');
    let major = leading_number(parts.next()?)?;
    let minor = parts.next().map_or(Some(0), leading_number)?;
    Some((major, minor))
}

// Digits at the start of a segment, so "5rc1" reads as 5.
fn leading_number(segment: &str) -> Option<u32> {
    let end = segment
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(segment.len());
    segment[..end].parse().ok()
}

/// Build arguments for a server image.
///
/// Order: `VERSION`, `BUILD_NO`, `FLAVOR`, then `MEMBASE_RAM_MEGS` when a
/// memory limit is set, then `BUILD_URL` and `BUILD_PKG` when a build URL
/// override is set.
pub fn build_args_for_version(options: &ProviderOptions) -> Result<Vec<BuildArg>> {
    let (ver, build) = split_version(&options.build)?;

    let mut args = vec![
        BuildArg::new("VERSION", ver),
        BuildArg::new("BUILD_NO", build),
        BuildArg::new("FLAVOR", resolve_flavor(ver)?),
    ];

    if options.memory > 0 {
        args.push(BuildArg::new(
            "MEMBASE_RAM_MEGS",
            options.memory_mb().to_string(),
        ));
    }

    let url = options.build_url_override.as_str();
    if !url.is_empty() {
        let package = url.rsplit('/').next().unwrap_or(url);
        args.push(BuildArg::new("BUILD_URL", url));
        args.push(BuildArg::new("BUILD_PKG", package));
    }

    Ok(args)
}

/// Build arguments for a gateway image: `VERSION` and `BUILD_NO` only.
pub fn build_args_for_gateway_version(options: &ProviderOptions) -> Result<Vec<BuildArg>> {
    let (ver, build) = split_version(&options.gateway_version)?;
    Ok(vec![
        BuildArg::new("VERSION", ver),
        BuildArg::new("BUILD_NO", build),
    ])
}
