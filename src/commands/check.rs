//! Prerequisite and version checks

use anyhow::Result;

use crate::utils::{CommonPrereqs, E2eError, Prerequisite};
use crate::version::is_version_string_in_range;

/// Check the local tools the suites shell out to
pub fn prerequisites(openshift: bool) -> Result<()> {
    crate::log_info!("Checking prerequisites...");

    let kubectl = CommonPrereqs::kubectl();
    let oc = CommonPrereqs::oc();

    let mut prereqs: Vec<&dyn Prerequisite> = vec![&kubectl];
    if openshift {
        prereqs.push(&oc);
    }

    let (found, missing) = CommonPrereqs::check_all(&prereqs);
    for name in &found {
        println!("  ✓ {}", name);
    }

    if let Some((name, hint)) = missing.first() {
        for (name, _) in &missing {
            println!("  ✗ {}", name);
        }
        return Err(E2eError::tool_not_found(name, hint).into());
    }

    crate::log_info!("✓ All prerequisites satisfied!");
    Ok(())
}

/// Print whether `version` lies in `[minimum, maximum]` and fail when it does not
pub fn version_in_range(version: &str, minimum: &str, maximum: &str) -> Result<bool> {
    let in_range = is_version_string_in_range(version, minimum, maximum)?;
    let bounds = format!(
        "[{}, {}]",
        if minimum.is_empty() { "-" } else { minimum },
        if maximum.is_empty() { "-" } else { maximum }
    );

    if in_range {
        println!("{} is within {}", version, bounds);
    } else {
        println!("{} is outside {}", version, bounds);
    }

    Ok(in_range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionError;

    #[test]
    fn test_version_in_range() {
        assert!(version_in_range("4.12.3", "4.12", "").unwrap());
        assert!(!version_in_range("4.11", "4.12", "").unwrap());
    }

    #[test]
    fn test_version_in_range_invalid_bound() {
        let err = version_in_range("4.12", "abc", "").unwrap_err();
        assert_eq!(
            err.downcast_ref::<VersionError>(),
            Some(&VersionError::InvalidBound {
                bound: "abc".to_string()
            })
        );
    }
}
