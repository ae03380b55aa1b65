//! Server-block templates for Apache and Nginx.
//!
//! Rendering is plain string substitution over fixed templates, so the
//! output is byte-for-byte reproducible. Each variant has an HTTP block
//! and an HTTPS block; the HTTPS block is only appended when
//! [`has_ssl_certificates`] holds.

use camino::Utf8Path;

use crate::config::{OsFamily, ServerVariant, SslMaterial, VhostSettings};

/// Apache log directory on Debian-family hosts (expanded by apache2ctl).
pub const APACHE_DEBIAN_LOG_DIR: &str = "${APACHE_LOG_DIR}";
/// Apache log directory on RHEL-family hosts.
pub const APACHE_RHEL_LOG_DIR: &str = "/var/log/httpd";
/// Nginx log directory.
pub const NGINX_LOG_DIR: &str = "/var/log/nginx";

const APACHE_HTTP_TEMPLATE: &str = r#"<VirtualHost *:80>
    ServerName {{host_name}}
    DocumentRoot {{document_root}}

    <Directory {{document_root}}>
        AllowOverride All
        Require all granted
    </Directory>

    ErrorLog {{log_dir}}/{{host_name}}_error.log
    CustomLog {{log_dir}}/{{host_name}}_access.log combined
</VirtualHost>
"#;

const APACHE_HTTPS_TEMPLATE: &str = r#"<VirtualHost *:443>
    ServerName {{host_name}}
    DocumentRoot {{document_root}}

    SSLEngine on
    SSLCertificateFile {{certificate}}
    SSLCertificateKeyFile {{certificate_key}}

    <Directory {{document_root}}>
        AllowOverride All
        Require all granted
    </Directory>

    ErrorLog {{log_dir}}/{{host_name}}_ssl_error.log
    CustomLog {{log_dir}}/{{host_name}}_ssl_access.log combined
</VirtualHost>
"#;

const NGINX_HTTP_TEMPLATE: &str = r#"server {
    listen 80;
    server_name {{host_name}};
    root {{document_root}};

    location / {
        try_files $uri /index.php$is_args$args;
    }

    location ~ ^/index\.php(/|$) {
        fastcgi_pass unix:{{php_fpm_socket}};
        fastcgi_split_path_info ^(.+\.php)(/.*)$;
        include fastcgi_params;
        fastcgi_param SCRIPT_FILENAME $realpath_root$fastcgi_script_name;
        fastcgi_param DOCUMENT_ROOT $realpath_root;
        internal;
    }

    location ~ \.php$ {
        return 404;
    }

    error_log {{log_dir}}/{{host_name}}_error.log;
    access_log {{log_dir}}/{{host_name}}_access.log;
}
"#;

const NGINX_HTTPS_TEMPLATE: &str = r#"server {
    listen 443 ssl;
    server_name {{host_name}};
    root {{document_root}};

    ssl_certificate {{certificate}};
    ssl_certificate_key {{certificate_key}};

    location / {
        try_files $uri /index.php$is_args$args;
    }

    location ~ ^/index\.php(/|$) {
        fastcgi_pass unix:{{php_fpm_socket}};
        fastcgi_split_path_info ^(.+\.php)(/.*)$;
        include fastcgi_params;
        fastcgi_param SCRIPT_FILENAME $realpath_root$fastcgi_script_name;
        fastcgi_param DOCUMENT_ROOT $realpath_root;
        fastcgi_param HTTPS on;
        internal;
    }

    location ~ \.php$ {
        return 404;
    }

    error_log {{log_dir}}/{{host_name}}_ssl_error.log;
    access_log {{log_dir}}/{{host_name}}_ssl_access.log;
}
"#;

/// Substitutes `{{key}}` placeholders in a single left-to-right pass.
///
/// Substituted values are never rescanned. Unknown keys are kept verbatim.
fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 128);
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match vars.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Returns the Apache log directory for the OS family.
pub fn apache_log_dir(os: OsFamily) -> &'static str {
    if os.is_debian_based() {
        APACHE_DEBIAN_LOG_DIR
    } else {
        APACHE_RHEL_LOG_DIR
    }
}

/// True iff TLS is enabled and both certificate paths are non-empty.
///
/// `enabled: true` with a missing path is not an error; the vhost is
/// simply rendered HTTP-only.
pub fn has_ssl_certificates(settings: &VhostSettings) -> bool {
    settings.ssl.as_ref().is_some_and(|ssl| {
        ssl.enabled && !ssl.certificate.trim().is_empty() && !ssl.certificate_key.trim().is_empty()
    })
}

pub fn render_apache_http(host_name: &str, document_root: &Utf8Path, log_dir: &str) -> String {
    fill(
        APACHE_HTTP_TEMPLATE,
        &[
            ("host_name", host_name),
            ("document_root", document_root.as_str()),
            ("log_dir", log_dir),
        ],
    )
}

pub fn render_apache_https(
    host_name: &str,
    document_root: &Utf8Path,
    log_dir: &str,
    ssl: &SslMaterial,
) -> String {
    fill(
        APACHE_HTTPS_TEMPLATE,
        &[
            ("host_name", host_name),
            ("document_root", document_root.as_str()),
            ("log_dir", log_dir),
            ("certificate", &ssl.certificate),
            ("certificate_key", &ssl.certificate_key),
        ],
    )
}

pub fn render_nginx_http(host_name: &str, document_root: &Utf8Path, php_fpm_socket: &str) -> String {
    fill(
        NGINX_HTTP_TEMPLATE,
        &[
            ("host_name", host_name),
            ("document_root", document_root.as_str()),
            ("log_dir", NGINX_LOG_DIR),
            ("php_fpm_socket", php_fpm_socket),
        ],
    )
}

pub fn render_nginx_https(
    host_name: &str,
    document_root: &Utf8Path,
    php_fpm_socket: &str,
    ssl: &SslMaterial,
) -> String {
    fill(
        NGINX_HTTPS_TEMPLATE,
        &[
            ("host_name", host_name),
            ("document_root", document_root.as_str()),
            ("log_dir", NGINX_LOG_DIR),
            ("php_fpm_socket", php_fpm_socket),
            ("certificate", &ssl.certificate),
            ("certificate_key", &ssl.certificate_key),
        ],
    )
}

/// A rendered vhost: one HTTP block, optionally followed by an HTTPS block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VhostDocument {
    pub http: String,
    pub https: Option<String>,
}

impl VhostDocument {
    /// Returns true when an HTTPS block is present.
    pub fn has_https(&self) -> bool {
        self.https.is_some()
    }

    /// The full file contents, blocks separated by a blank line.
    pub fn contents(&self) -> String {
        match &self.https {
            Some(https) => format!("{}\n{}", self.http, https),
            None => self.http.clone(),
        }
    }
}

/// Renders the document for the configured variant.
pub fn render_vhost(
    settings: &VhostSettings,
    os: OsFamily,
    host_name: &str,
    document_root: &Utf8Path,
) -> VhostDocument {
    let ssl = settings.ssl.as_ref().filter(|_| has_ssl_certificates(settings));

    match settings.server {
        ServerVariant::Apache2 => {
            let log_dir = apache_log_dir(os);
            VhostDocument {
                http: render_apache_http(host_name, document_root, log_dir),
                https: ssl.map(|ssl| render_apache_https(host_name, document_root, log_dir, ssl)),
            }
        }
        ServerVariant::Nginx => {
            let socket = settings.php_fpm_socket.as_str();
            VhostDocument {
                http: render_nginx_http(host_name, document_root, socket),
                https: ssl.map(|ssl| render_nginx_https(host_name, document_root, socket, ssl)),
            }
        }
    }
}
