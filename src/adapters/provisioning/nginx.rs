//! Nginx vhost generation and application.
//!
//! Rendering is pure string work so templates can be asserted on in tests.
//! Applying a vhost is the side-effecting half: write to sites-available,
//! link into sites-enabled, then `nginx -t` before any reload. A config
//! that fails the test never reaches the running server.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

use crate::domain::tenant::Hostname;

/// Certificate material referenced by an HTTPS vhost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Errors from vhost application.
#[derive(Debug, Clone, Error)]
pub enum NginxError {
    #[error("Filesystem error at {path}: {detail}")]
    Io { path: String, detail: String },

    #[error("nginx rejected the configuration: {0}")]
    ConfigTest(String),

    #[error("nginx reload failed: {0}")]
    Reload(String),
}

impl NginxError {
    fn io(path: &Path, detail: impl std::fmt::Display) -> Self {
        NginxError::Io {
            path: path.display().to_string(),
            detail: detail.to_string(),
        }
    }
}

/// Renders and applies per-store nginx vhosts.
#[derive(Debug, Clone)]
pub struct NginxConfigGenerator {
    sites_available: PathBuf,
    sites_enabled: PathBuf,

    /// Webroot served under `/.well-known/acme-challenge/`.
    acme_webroot: PathBuf,

    /// PHP-FPM socket the storefront runs behind.
    php_fpm_socket: String,

    /// Path to the nginx executable. If None, will search PATH.
    nginx_path: Option<String>,

    /// When false, `apply` stops after writing and linking. Used in tests
    /// and on hosts where reloads are operator-driven.
    reload_enabled: bool,
}

impl NginxConfigGenerator {
    pub fn new(
        sites_available: impl Into<PathBuf>,
        sites_enabled: impl Into<PathBuf>,
        acme_webroot: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sites_available: sites_available.into(),
            sites_enabled: sites_enabled.into(),
            acme_webroot: acme_webroot.into(),
            php_fpm_socket: "/var/run/php/php8.2-fpm.sock".to_string(),
            nginx_path: None,
            reload_enabled: true,
        }
    }

    /// Set the PHP-FPM socket path.
    pub fn with_php_fpm_socket(mut self, socket: impl Into<String>) -> Self {
        self.php_fpm_socket = socket.into();
        self
    }

    /// Set a custom path to the nginx executable.
    pub fn with_nginx_path(mut self, path: impl Into<String>) -> Self {
        self.nginx_path = Some(path.into());
        self
    }

    /// Disable the config test and reload after writing.
    pub fn without_reload(mut self) -> Self {
        self.reload_enabled = false;
        self
    }

    fn nginx_command(&self) -> &str {
        self.nginx_path.as_deref().unwrap_or("nginx")
    }

    fn vhost_filename(hostname: &Hostname) -> String {
        format!("{}.conf", hostname)
    }

    /// Render the vhost for a store.
    ///
    /// Without TLS material the vhost serves plain HTTP with the ACME
    /// webroot exposed, so issuance can complete. With TLS material port 80
    /// keeps only the ACME location and redirects everything else.
    pub fn render(&self, hostname: &Hostname, app_path: &Path, tls: Option<&TlsPaths>) -> String {
        match tls {
            None => self.render_http(hostname, app_path),
            Some(tls) => self.render_https(hostname, app_path, tls),
        }
    }

    fn acme_location(&self) -> String {
        format!(
            r#"    location ^~ /.well-known/acme-challenge/ {{
        root {acme};
        default_type "text/plain";
    }}"#,
            acme = self.acme_webroot.display()
        )
    }

    fn app_locations(&self, app_path: &Path) -> String {
        format!(
            r#"    root {app}/public;
    index index.php;

    # Product images upload through the storefront admin
    client_max_body_size 64m;

    location / {{
        try_files $uri $uri/ /index.php?$query_string;
    }}

    location ~ \.php$ {{
        include snippets/fastcgi-php.conf;
        fastcgi_pass unix:{socket};
    }}

    location ~ /\.(?!well-known).* {{
        deny all;
    }}"#,
            app = app_path.display(),
            socket = self.php_fpm_socket
        )
    }

    fn render_http(&self, hostname: &Hostname, app_path: &Path) -> String {
        format!(
            r#"server {{
    listen 80;
    listen [::]:80;
    server_name {host};

{acme}

{app}
}}
"#,
            host = hostname,
            acme = self.acme_location(),
            app = self.app_locations(app_path)
        )
    }

    fn render_https(&self, hostname: &Hostname, app_path: &Path, tls: &TlsPaths) -> String {
        format!(
            r#"server {{
    listen 80;
    listen [::]:80;
    server_name {host};

{acme}

    location / {{
        return 301 https://$host$request_uri;
    }}
}}

server {{
    listen 443 ssl http2;
    listen [::]:443 ssl http2;
    server_name {host};

    ssl_certificate {cert};
    ssl_certificate_key {key};
    ssl_protocols TLSv1.2 TLSv1.3;
    ssl_ciphers ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:ECDHE-ECDSA-AES256-GCM-SHA384:ECDHE-RSA-AES256-GCM-SHA384:ECDHE-ECDSA-CHACHA20-POLY1305:ECDHE-RSA-CHACHA20-POLY1305;
    ssl_prefer_server_ciphers off;
    ssl_session_timeout 1d;
    ssl_session_cache shared:SSL:10m;

    add_header Strict-Transport-Security "max-age=31536000; includeSubDomains" always;

{app}
}}
"#,
            host = hostname,
            acme = self.acme_location(),
            cert = tls.cert_path.display(),
            key = tls.key_path.display(),
            app = self.app_locations(app_path)
        )
    }

    /// Write the vhost, enable it, and reload nginx behind a config test.
    pub async fn apply(&self, hostname: &Hostname, contents: &str) -> Result<(), NginxError> {
        let filename = Self::vhost_filename(hostname);
        let available = self.sites_available.join(&filename);
        let enabled = self.sites_enabled.join(&filename);

        tokio::fs::write(&available, contents)
            .await
            .map_err(|e| NginxError::io(&available, e))?;

        // Re-linking must be idempotent for provisioning retries.
        match tokio::fs::remove_file(&enabled).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(NginxError::io(&enabled, e)),
        }
        tokio::fs::symlink(&available, &enabled)
            .await
            .map_err(|e| NginxError::io(&enabled, e))?;

        if !self.reload_enabled {
            return Ok(());
        }

        if let Err(test_failure) = self.test_config().await {
            // A broken vhost must not survive to the next manual reload.
            let _ = tokio::fs::remove_file(&enabled).await;
            tracing::error!(hostname = %hostname, "vhost failed nginx -t, disabled again");
            return Err(test_failure);
        }

        self.reload().await?;
        tracing::info!(hostname = %hostname, "vhost applied and nginx reloaded");
        Ok(())
    }

    async fn test_config(&self) -> Result<(), NginxError> {
        let output = Command::new(self.nginx_command())
            .arg("-t")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| NginxError::ConfigTest(format!("failed to start nginx: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NginxError::ConfigTest(stderr.trim().to_string()));
        }
        Ok(())
    }

    async fn reload(&self) -> Result<(), NginxError> {
        let output = Command::new(self.nginx_command())
            .args(["-s", "reload"])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| NginxError::Reload(format!("failed to start nginx: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NginxError::Reload(stderr.trim().to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> NginxConfigGenerator {
        NginxConfigGenerator::new(
            "/etc/nginx/sites-available",
            "/etc/nginx/sites-enabled",
            "/var/www/acme",
        )
    }

    fn hostname() -> Hostname {
        Hostname::new("shop.vumashops.com").unwrap()
    }

    // ════════════════════════════════════════════════════════════════════════
    // Template Tests
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn http_vhost_serves_acme_challenges() {
        let config = generator().render(&hostname(), Path::new("/var/www/tenants/abc"), None);

        assert!(config.contains("server_name shop.vumashops.com;"));
        assert!(config.contains("location ^~ /.well-known/acme-challenge/"));
        assert!(config.contains("root /var/www/acme;"));
        assert!(config.contains("root /var/www/tenants/abc/public;"));
        assert!(!config.contains("ssl_certificate"));
        assert!(!config.contains("return 301"));
    }

    #[test]
    fn https_vhost_redirects_and_pins_tls() {
        let tls = TlsPaths {
            cert_path: PathBuf::from("/etc/letsencrypt/live/shop.vumashops.com/fullchain.pem"),
            key_path: PathBuf::from("/etc/letsencrypt/live/shop.vumashops.com/privkey.pem"),
        };
        let config = generator().render(&hostname(), Path::new("/var/www/tenants/abc"), Some(&tls));

        assert!(config.contains("return 301 https://$host$request_uri;"));
        assert!(config.contains("listen 443 ssl http2;"));
        assert!(config
            .contains("ssl_certificate /etc/letsencrypt/live/shop.vumashops.com/fullchain.pem;"));
        assert!(config
            .contains("ssl_certificate_key /etc/letsencrypt/live/shop.vumashops.com/privkey.pem;"));
        assert!(config.contains("TLSv1.2 TLSv1.3"));
        assert!(config.contains("Strict-Transport-Security"));
    }

    #[test]
    fn https_vhost_keeps_acme_reachable_for_renewal() {
        let tls = TlsPaths {
            cert_path: PathBuf::from("/tmp/fullchain.pem"),
            key_path: PathBuf::from("/tmp/privkey.pem"),
        };
        let config = generator().render(&hostname(), Path::new("/var/www/tenants/abc"), Some(&tls));

        let redirect_at = config.find("return 301").unwrap();
        let acme_at = config.find("acme-challenge").unwrap();
        assert!(acme_at < redirect_at);
    }

    #[test]
    fn vhost_limits_upload_size_for_product_images() {
        let config = generator().render(&hostname(), Path::new("/var/www/tenants/abc"), None);
        assert!(config.contains("client_max_body_size 64m;"));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Apply Tests
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn apply_writes_vhost_and_enables_it() {
        let root = tempfile::tempdir().unwrap();
        let available = root.path().join("sites-available");
        let enabled = root.path().join("sites-enabled");
        std::fs::create_dir_all(&available).unwrap();
        std::fs::create_dir_all(&enabled).unwrap();

        let generator =
            NginxConfigGenerator::new(&available, &enabled, "/var/www/acme").without_reload();
        let config = generator.render(&hostname(), Path::new("/var/www/tenants/abc"), None);

        generator.apply(&hostname(), &config).await.unwrap();

        let written = available.join("shop.vumashops.com.conf");
        assert_eq!(std::fs::read_to_string(&written).unwrap(), config);

        let link = enabled.join("shop.vumashops.com.conf");
        assert_eq!(std::fs::read_link(&link).unwrap(), written);
    }

    #[tokio::test]
    async fn apply_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let available = root.path().join("sites-available");
        let enabled = root.path().join("sites-enabled");
        std::fs::create_dir_all(&available).unwrap();
        std::fs::create_dir_all(&enabled).unwrap();

        let generator =
            NginxConfigGenerator::new(&available, &enabled, "/var/www/acme").without_reload();

        generator.apply(&hostname(), "server {}").await.unwrap();
        generator.apply(&hostname(), "server { listen 80; }").await.unwrap();

        let written = available.join("shop.vumashops.com.conf");
        assert_eq!(
            std::fs::read_to_string(written).unwrap(),
            "server { listen 80; }"
        );
    }

    #[tokio::test]
    async fn failed_config_test_disables_the_vhost() {
        let root = tempfile::tempdir().unwrap();
        let available = root.path().join("sites-available");
        let enabled = root.path().join("sites-enabled");
        std::fs::create_dir_all(&available).unwrap();
        std::fs::create_dir_all(&enabled).unwrap();

        // `false` stands in for an nginx whose config test rejects.
        let generator = NginxConfigGenerator::new(&available, &enabled, "/var/www/acme")
            .with_nginx_path("false");

        let err = generator.apply(&hostname(), "server {}").await.unwrap_err();

        assert!(matches!(err, NginxError::ConfigTest(_)));
        assert!(!enabled.join("shop.vumashops.com.conf").exists());
        assert!(available.join("shop.vumashops.com.conf").exists());
    }
}
