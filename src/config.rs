//! Settings loading for vhostctl.
//!
//! The project configuration is a YAML document (by default
//! `config/packages/castor.yaml`) holding a `castor.vhost` section:
//!
//! ```yaml
//! castor.vhost:
//!   url: local
//!   nom: demo
//!   server: nginx
//!   os: debian
//!   ssl:
//!     enabled: true
//!     certificate: /etc/ssl/certs/demo.pem
//!     certificate_key: /etc/ssl/private/demo.key
//! ```
//!
//! The section may also live under `parameters:` or as a nested
//! `castor: { vhost: ... }` mapping.

use std::fs;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use strum::{Display, EnumString};
use tracing::debug;

use crate::error::{VhostError, io_error_kind_message};
use crate::privilege::PrivilegeMethod;

/// Default location of the settings document, relative to the project directory.
pub const DEFAULT_SETTINGS_PATH: &str = "config/packages/castor.yaml";

/// Key of the vhost section.
pub const SECTION_KEY: &str = "castor.vhost";

/// Default PHP-FPM socket used by Nginx server blocks.
pub const DEFAULT_PHP_FPM_SOCKET: &str = "/var/run/php/php-fpm.sock";

/// Web server implementation targeted by the virtual host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ServerVariant {
    /// Apache httpd (`apache2` on Debian, `httpd` on RHEL)
    Apache2,
    /// Nginx
    Nginx,
}

/// Operating system family; selects Apache filesystem layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Debian,
    Ubuntu,
    Rhel,
}

impl OsFamily {
    /// Returns true for the Debian family (`sites-available` + `a2ensite`).
    pub fn is_debian_based(&self) -> bool {
        matches!(self, Self::Debian | Self::Ubuntu)
    }

    /// Detects the OS family from release files under `root`.
    ///
    /// Falls back to Debian when neither marker is present.
    pub fn detect(root: &Utf8Path) -> Self {
        if root.join("etc/debian_version").exists() {
            Self::Debian
        } else if root.join("etc/redhat-release").exists() {
            Self::Rhel
        } else {
            debug!("no OS release marker under {}, assuming debian", root);
            Self::Debian
        }
    }
}

/// TLS certificate material.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SslMaterial {
    #[serde(default)]
    pub enabled: bool,
    /// Path to the certificate (chain) file
    #[serde(default)]
    pub certificate: String,
    /// Path to the private key file
    #[serde(default)]
    pub certificate_key: String,
}

/// Vhost settings, loaded once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VhostSettings {
    pub server: ServerVariant,
    /// `None` means "detect from the host".
    pub os: Option<OsFamily>,
    pub project_name: Option<String>,
    pub domain: Option<String>,
    pub ssl: Option<SslMaterial>,
    /// Relative to the project directory; `None` means `{project_dir}/public`.
    pub document_root: Option<Utf8PathBuf>,
    pub php_fpm_socket: String,
    pub privilege: PrivilegeMethod,
}

impl VhostSettings {
    /// Creates settings for `server` with every optional field unset.
    pub fn new(server: ServerVariant) -> Self {
        Self {
            server,
            os: None,
            project_name: None,
            domain: None,
            ssl: None,
            document_root: None,
            php_fpm_socket: DEFAULT_PHP_FPM_SOCKET.to_string(),
            privilege: PrivilegeMethod::default(),
        }
    }

    /// Validates values that end up inside server directives.
    ///
    /// The host name and document root depend on the project directory
    /// and are checked once it is known.
    pub fn validate(&self) -> Result<(), VhostError> {
        if self.server == ServerVariant::Nginx {
            validate_directive_path("php_fpm_socket", &self.php_fpm_socket)?;
        }
        if let Some(ssl) = &self.ssl {
            for (label, value) in [
                ("ssl.certificate", &ssl.certificate),
                ("ssl.certificate_key", &ssl.certificate_key),
            ] {
                if !value.is_empty() {
                    validate_directive_path(label, value)?;
                }
            }
        }
        Ok(())
    }
}

/// Rejects paths that could break out of a server directive.
///
/// The path must be absolute and must not contain whitespace, quotes,
/// `;`, braces or control characters.
pub fn validate_directive_path(label: &str, value: &str) -> Result<(), VhostError> {
    if value.is_empty() {
        return Err(VhostError::Validation(format!("{} must not be empty", label)));
    }
    if !value.starts_with('/') {
        return Err(VhostError::Validation(format!(
            "{} must be an absolute path, got {:?}",
            label, value
        )));
    }
    if let Some(c) = value
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '"' | '\'' | ';' | '{' | '}'))
    {
        return Err(VhostError::Validation(format!(
            "{} contains forbidden character {:?}: {:?}",
            label, c, value
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVhostSection {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    nom: Option<String>,
    server: String,
    #[serde(default)]
    os: Option<String>,
    #[serde(default)]
    ssl: Option<SslMaterial>,
    #[serde(default)]
    document_root: Option<Utf8PathBuf>,
    #[serde(default)]
    php_fpm_socket: Option<String>,
    #[serde(default)]
    privilege: PrivilegeMethod,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl RawVhostSection {
    fn into_settings(self) -> Result<VhostSettings, VhostError> {
        let server = ServerVariant::from_str(self.server.trim())
            .map_err(|_| VhostError::UnsupportedServer(self.server.clone()))?;

        let os = match non_empty(self.os) {
            Some(os) => Some(OsFamily::from_str(os.trim()).map_err(|_| {
                VhostError::Config(format!(
                    "unsupported os {:?} (expected debian, ubuntu or rhel)",
                    os
                ))
            })?),
            None => None,
        };

        Ok(VhostSettings {
            server,
            os,
            project_name: non_empty(self.nom),
            domain: non_empty(self.url),
            ssl: self.ssl,
            document_root: self.document_root,
            php_fpm_socket: non_empty(self.php_fpm_socket)
                .unwrap_or_else(|| DEFAULT_PHP_FPM_SOCKET.to_string()),
            privilege: self.privilege,
        })
    }
}

/// Finds the vhost section in a parsed document.
fn find_section(doc: &Value) -> Option<&Value> {
    let candidates = [
        doc.get(SECTION_KEY),
        doc.get("parameters").and_then(|p| p.get(SECTION_KEY)),
        doc.get("castor").and_then(|c| c.get("vhost")),
    ];
    candidates.into_iter().flatten().find(|v| !v.is_null())
}

/// Parses settings from YAML text. `origin` names the document in errors.
pub fn parse_settings(yaml: &str, origin: &str) -> Result<VhostSettings, VhostError> {
    let doc: Value = serde_yaml::from_str(yaml)
        .map_err(|e| VhostError::Config(format!("failed to parse {}: {}", origin, e)))?;

    let section = find_section(&doc).ok_or_else(|| VhostError::SectionMissing(origin.to_string()))?;

    let raw: RawVhostSection = serde_yaml::from_value(section.clone()).map_err(|e| {
        VhostError::Config(format!("invalid {} section in {}: {}", SECTION_KEY, origin, e))
    })?;

    raw.into_settings()
}

/// Loads the settings document at `path`.
///
/// # Errors
///
/// - `ConfigMissing` if the file does not exist
/// - `SectionMissing` if it has no vhost section
/// - `UnsupportedServer` for an unknown `server` value
/// - `Config` for any other read or parse failure
pub fn load_settings(path: &Utf8Path) -> Result<VhostSettings, VhostError> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VhostError::ConfigMissing(path.to_string()));
        }
        Err(e) => {
            return Err(VhostError::Config(format!(
                "failed to read {}: {}",
                path,
                io_error_kind_message(&e)
            )));
        }
    };

    debug!("loaded settings document {}", path);
    parse_settings(&contents, path.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_variant_round_trips_through_strings() {
        assert_eq!(ServerVariant::from_str("apache2").unwrap(), ServerVariant::Apache2);
        assert_eq!(ServerVariant::from_str("nginx").unwrap(), ServerVariant::Nginx);
        assert_eq!(ServerVariant::Apache2.to_string(), "apache2");
        assert!(ServerVariant::from_str("caddy").is_err());
    }

    #[test]
    fn os_family_debian_based() {
        assert!(OsFamily::Debian.is_debian_based());
        assert!(OsFamily::Ubuntu.is_debian_based());
        assert!(!OsFamily::Rhel.is_debian_based());
    }

    #[test]
    fn empty_strings_are_absent() {
        let settings = parse_settings(
            "castor.vhost:\n  server: nginx\n  nom: ''\n  url: '  '\n",
            "inline",
        )
        .unwrap();
        assert_eq!(settings.project_name, None);
        assert_eq!(settings.domain, None);
    }

    #[test]
    fn null_section_is_missing() {
        let err = parse_settings("castor.vhost: ~\n", "inline").unwrap_err();
        assert!(matches!(err, VhostError::SectionMissing(_)));
    }

    #[test]
    fn validate_directive_path_rejects_injection() {
        assert!(validate_directive_path("document_root", "/srv/app/public").is_ok());
        for bad in ["relative/path", "/srv/app public", "/srv/app;", "/srv/{x}", "/srv/\"x", "/srv/a\nb"] {
            assert!(
                matches!(
                    validate_directive_path("document_root", bad),
                    Err(VhostError::Validation(_))
                ),
                "{:?} should be rejected",
                bad
            );
        }
    }
}
