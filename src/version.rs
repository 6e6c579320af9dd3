//! Version gating for operator-dependent test behavior

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// A non-empty bound that is not at least two dot separated integers.
    /// Callers setting up tests treat this as fatal.
    #[error("invalid version bound provided: '{bound}'")]
    InvalidBound { bound: String },
}

/// Parse the first two numeric components of a dotted version string.
///
/// `"4.12.3"` gives `(4, 12)`; anything with fewer than two components or with
/// non-numeric leading components gives `None`.
pub fn parse_major_minor(input: &str) -> Option<(u64, u64)> {
    let mut splits = input.split('.');
    let major = splits.next()?.parse().ok()?;
    let minor = splits.next()?.parse().ok()?;
    Some((major, minor))
}

fn parse_bound(bound: &str) -> Result<Option<(u64, u64)>, VersionError> {
    if bound.is_empty() {
        return Ok(None);
    }

    parse_major_minor(bound)
        .map(Some)
        .ok_or_else(|| VersionError::InvalidBound {
            bound: bound.to_string(),
        })
}

/// Check whether `version` lies within `[minimum, maximum]` on its major.minor part.
///
/// An empty `minimum` means `0.0` and an empty `maximum` means unbounded. A version
/// that cannot be parsed (`"latest"`, `""`) is assumed to be new enough: it is in
/// range only when no maximum was given.
pub fn is_version_string_in_range(
    version: &str,
    minimum: &str,
    maximum: &str,
) -> Result<bool, VersionError> {
    let minimum_digits = parse_bound(minimum)?.unwrap_or((0, 0));
    let maximum_digits = parse_bound(maximum)?;

    let Some(version_digits) = parse_major_minor(version) else {
        return Ok(maximum_digits.is_none());
    };

    if version_digits < minimum_digits {
        return Ok(false);
    }

    Ok(maximum_digits.is_none_or(|max| version_digits <= max))
}
