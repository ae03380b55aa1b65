//! Virtual host name derivation.

use std::sync::LazyLock;

use regex::Regex;
use url::Host;

use crate::error::VhostError;

/// Domain used when the settings do not name one.
pub const DEFAULT_DOMAIN: &str = "test";

/// Maximum length of a DNS name.
const MAX_HOST_NAME_LEN: usize = 253;

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("label regex is valid")
});

/// Builds `"{project}.{domain}"`.
///
/// `project_name` falls back to `cwd_basename`, `domain` to
/// [`DEFAULT_DOMAIN`]. No validation happens here; see
/// [`validate_host_name`].
pub fn build_host_name(project_name: Option<&str>, domain: Option<&str>, cwd_basename: &str) -> String {
    let project = project_name.unwrap_or(cwd_basename);
    let domain = domain.unwrap_or(DEFAULT_DOMAIN);
    format!("{}.{}", project, domain)
}

/// Checks that a host name is safe to embed in a file name and in
/// `ServerName` / `server_name` directives.
///
/// Every label must be alphanumeric with inner hyphens, and the whole
/// name must parse as a domain (not an IP address).
pub fn validate_host_name(host_name: &str) -> Result<(), VhostError> {
    if host_name.is_empty() || host_name.len() > MAX_HOST_NAME_LEN {
        return Err(VhostError::Validation(format!(
            "host name must be between 1 and {} characters, got {}",
            MAX_HOST_NAME_LEN,
            host_name.len()
        )));
    }

    if let Some(label) = host_name.split('.').find(|label| !LABEL_RE.is_match(label)) {
        return Err(VhostError::Validation(format!(
            "invalid label {:?} in host name {:?}: labels must be alphanumeric with inner hyphens",
            label, host_name
        )));
    }

    match Host::parse(host_name) {
        Ok(Host::Domain(_)) => Ok(()),
        Ok(_) => Err(VhostError::Validation(format!(
            "host name {:?} is an IP address, expected a domain name",
            host_name
        ))),
        Err(e) => Err(VhostError::Validation(format!(
            "host name {:?} is not a valid domain: {}",
            host_name, e
        ))),
    }
}
