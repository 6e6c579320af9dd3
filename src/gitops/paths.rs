//! Git URLs and site generator versions

use super::GitopsError;

/// Join URL or path pieces with `/` without doubling slashes at the joins.
///
/// At most one slash is dropped per join, so slashes belonging to a piece are kept
/// and `http://` survives.
pub fn join_git_paths<S: AsRef<str>>(inputs: &[S]) -> String {
    let mut joined = String::new();

    for (index, input) in inputs.iter().enumerate() {
        let input = input.as_ref();
        if index == 0 {
            joined.push_str(input);
            continue;
        }

        if joined.ends_with('/') {
            joined.push_str(input.strip_prefix('/').unwrap_or(input));
        } else {
            if !input.starts_with('/') {
                joined.push('/');
            }
            joined.push_str(input);
        }
    }

    joined
}

/// Raw file URL of `path` on `branch` for a git web host
pub fn git_raw_url(repo: &str, branch: &str, path: &str) -> String {
    join_git_paths(&[repo.replacen(".git", "", 1).as_str(), "raw", branch, path])
}

/// Whether `path` exists on `branch` of `repo`, checked over HTTP(S).
///
/// Lab git servers use self-signed certificates so verification is disabled.
pub async fn does_git_path_exist(
    repo: &str,
    branch: &str,
    path: &str,
) -> Result<bool, GitopsError> {
    let url = git_raw_url(repo, branch, path);
    tracing::info!("Checking if git url '{}' exists", url);

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()?;

    let found = match client.get(&url).send().await {
        Ok(response) => response.status() == reqwest::StatusCode::OK,
        Err(e) => {
            tracing::debug!(error = %e, "git url request failed");
            false
        }
    };

    if found {
        tracing::info!("found valid git url for '{}'", path);
    } else {
        tracing::info!("could not find valid url for '{}'", path);
    }

    Ok(found)
}

/// ZTP version from a site generator image reference.
///
/// Returns `None` when the image is not a site generator, `Some("")` for `latest`,
/// and the tag without its leading `v` otherwise.
pub fn ztp_version_from_image(image: &str) -> Option<String> {
    // 4.11 ships ztp-site-generator, later releases ztp-site-generate
    if !image.contains("ztp-site-gen") {
        return None;
    }

    let tag = image.rsplit(':').next().unwrap_or_default();
    if tag == "latest" {
        tracing::info!("Site generator version tag was 'latest', so returning empty version");
        return Some(String::new());
    }

    Some(tag.strip_prefix('v').unwrap_or(tag).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_without_double_slashes() {
        assert_eq!(join_git_paths(&["http://x/", "/y/", "/z"]), "http://x/y/z");
        assert_eq!(join_git_paths(&["a", "b", "c"]), "a/b/c");
    }

    #[test]
    fn test_join_keeps_inner_double_slashes() {
        assert_eq!(
            join_git_paths(&["https://git.lab:3000/ztp//site", "raw"]),
            "https://git.lab:3000/ztp//site/raw"
        );
        assert_eq!(join_git_paths(&["http://", "x"]), "http://x");
        assert_eq!(join_git_paths(&["a//", "b"]), "a//b");
        assert_eq!(join_git_paths(&["a", "//b"]), "a//b");
    }

    #[test]
    fn test_join_edge_cases() {
        assert_eq!(join_git_paths::<&str>(&[]), "");
        assert_eq!(join_git_paths(&["only"]), "only");
        assert_eq!(join_git_paths(&["a", "", "b"]), "a/b");
    }

    #[test]
    fn test_git_raw_url() {
        assert_eq!(
            git_raw_url("https://git.lab/ran/ztp-site-configs.git", "main", "/siteconfig/"),
            "https://git.lab/ran/ztp-site-configs/raw/main/siteconfig/"
        );
    }

    #[test]
    fn test_ztp_version_from_image() {
        assert_eq!(
            ztp_version_from_image("registry.redhat.io/openshift4/ztp-site-generate-rhel8:v4.14.2"),
            Some("4.14.2".to_string())
        );
        assert_eq!(
            ztp_version_from_image("quay.io/openshift-kni/ztp-site-generator:latest"),
            Some(String::new())
        );
        assert_eq!(ztp_version_from_image("quay.io/argoproj/argocd:v2.8.0"), None);
    }
}
