//! Bagisto store installer.
//!
//! Stands up one storefront from a golden template: copy the application
//! tree, write its `.env`, then drive `php artisan` for key generation,
//! migrations, and seeding. The seeders read the admin credential from the
//! environment of the seed step, so the generated password never lands in
//! a file.
//!
//! PHP must be installed on the app server; availability is probed before
//! the first step.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::process::Command;

use crate::ports::{InstallError, InstallReport, InstallSpec, StoreInstaller};

/// Store installer shelling out to `php artisan`.
#[derive(Debug, Clone)]
pub struct BagistoInstaller {
    /// Path to the php executable. If None, will search PATH.
    php_path: Option<String>,

    /// Golden copy of the storefront application.
    template_path: PathBuf,

    /// Host the per-tenant databases live on, written into `.env`.
    db_host: String,

    /// Timeout for one install step in seconds. Migrations on a cold
    /// database dominate.
    step_timeout_secs: u64,
}

impl BagistoInstaller {
    /// Create an installer with default settings.
    pub fn new(template_path: impl Into<PathBuf>) -> Self {
        Self {
            php_path: None,
            template_path: template_path.into(),
            db_host: "127.0.0.1".to_string(),
            step_timeout_secs: 300,
        }
    }

    /// Set a custom path to the php executable.
    pub fn with_php_path(mut self, path: impl Into<String>) -> Self {
        self.php_path = Some(path.into());
        self
    }

    /// Set the database host written into `.env`.
    pub fn with_db_host(mut self, host: impl Into<String>) -> Self {
        self.db_host = host.into();
        self
    }

    /// Set the timeout for one install step.
    pub fn with_step_timeout(mut self, timeout_secs: u64) -> Self {
        self.step_timeout_secs = timeout_secs;
        self
    }

    fn php_command(&self) -> &str {
        self.php_path.as_deref().unwrap_or("php")
    }

    /// Check that PHP is installed and runnable.
    async fn check_php(&self) -> bool {
        let output = Command::new(self.php_command())
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await;

        output.map(|o| o.status.success()).unwrap_or(false)
    }

    fn artisan(&self, path: &Path) -> Command {
        let mut command = Command::new(self.php_command());
        command.current_dir(path).arg("artisan");
        command
    }

    async fn run_step(&self, step: &str, mut command: Command) -> Result<(), InstallError> {
        let output = tokio::time::timeout(
            std::time::Duration::from_secs(self.step_timeout_secs),
            command
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| InstallError::Timeout {
            step: step.to_string(),
            seconds: self.step_timeout_secs,
        })?
        .map_err(|e| InstallError::step_failed(step, format!("failed to start: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(step = %step, "install step failed: {}", stderr.trim());
            return Err(InstallError::step_failed(step, stderr.trim().to_string()));
        }

        Ok(())
    }

    /// Lay down the application tree from the template.
    ///
    /// A tree that already exists is left alone so interrupted provisioning
    /// can retry without re-copying gigabytes of vendor code.
    async fn copy_template(&self, target: &Path) -> Result<(), InstallError> {
        if tokio::fs::try_exists(target).await.unwrap_or(false) {
            tracing::info!(path = %target.display(), "application tree already present, skipping copy");
            return Ok(());
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| InstallError::filesystem(parent.display().to_string(), e.to_string()))?;
        }

        let mut command = Command::new("cp");
        command
            .arg("-a")
            .arg(&self.template_path)
            .arg(target);
        self.run_step("copy", command).await
    }

    /// Render the storefront `.env` for one tenant.
    fn render_env(&self, spec: &InstallSpec) -> String {
        format!(
            r#"APP_NAME=VumaShops
APP_ENV=production
APP_KEY=
APP_DEBUG=false
APP_URL={app_url}
APP_TIMEZONE={timezone}
APP_LOCALE={locale}
APP_CURRENCY={currency}

DB_CONNECTION=mysql
DB_HOST={db_host}
DB_PORT=3306
DB_DATABASE={db_name}
DB_USERNAME={db_user}
DB_PASSWORD={db_password}

SESSION_DRIVER=file
CACHE_STORE=file
QUEUE_CONNECTION=sync
"#,
            app_url = spec.app_url,
            timezone = spec.timezone,
            locale = spec.locale,
            currency = spec.currency.code(),
            db_host = self.db_host,
            db_name = spec.db_name,
            db_user = spec.db_user,
            db_password = spec.db_password.expose_secret(),
        )
    }

    async fn installed_version(&self, path: &Path) -> String {
        let composer = path.join("composer.json");
        let Ok(contents) = tokio::fs::read_to_string(&composer).await else {
            return "unknown".to_string();
        };

        serde_json::from_str::<serde_json::Value>(&contents)
            .ok()
            .and_then(|manifest| {
                manifest["require"]["bagisto/bagisto"]
                    .as_str()
                    .or_else(|| manifest["version"].as_str())
                    .map(String::from)
            })
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[async_trait]
impl StoreInstaller for BagistoInstaller {
    async fn install(&self, spec: &InstallSpec) -> Result<InstallReport, InstallError> {
        if !self.check_php().await {
            return Err(InstallError::ToolUnavailable(format!(
                "'{}' is not installed or not executable",
                self.php_command()
            )));
        }

        self.copy_template(&spec.path).await?;

        let env_path = spec.path.join(".env");
        tokio::fs::write(&env_path, self.render_env(spec))
            .await
            .map_err(|e| InstallError::filesystem(env_path.display().to_string(), e.to_string()))?;

        let mut key_generate = self.artisan(&spec.path);
        key_generate.args(["key:generate", "--force"]);
        self.run_step("key:generate", key_generate).await?;

        let mut migrate = self.artisan(&spec.path);
        migrate.args(["migrate", "--force"]);
        self.run_step("migrate", migrate).await?;

        let mut seed = self.artisan(&spec.path);
        seed.args(["db:seed", "--force"])
            .env("SEED_ADMIN_EMAIL", &spec.admin_email)
            .env("SEED_ADMIN_PASSWORD", spec.admin_password.expose_secret());
        self.run_step("db:seed", seed).await?;

        let version = self.installed_version(&spec.path).await;
        tracing::info!(
            tenant_id = %spec.tenant_id,
            path = %spec.path.display(),
            version = %version,
            "storefront installed"
        );

        Ok(InstallReport { version })
    }

    async fn configure_headless(&self, path: &Path) -> Result<(), InstallError> {
        let mut install = self.artisan(path);
        install.arg("bagisto-graphql:install");
        self.run_step("bagisto-graphql:install", install).await
    }

    async fn harden(&self, path: &Path) -> Result<(), InstallError> {
        let mut storage_link = self.artisan(path);
        storage_link.arg("storage:link");
        self.run_step("storage:link", storage_link).await?;

        let mut config_cache = self.artisan(path);
        config_cache.arg("config:cache");
        self.run_step("config:cache", config_cache).await?;

        let mut route_cache = self.artisan(path);
        route_cache.arg("route:cache");
        self.run_step("route:cache", route_cache).await?;

        let mut permissions = Command::new("chmod");
        permissions
            .current_dir(path)
            .args(["-R", "775", "storage", "bootstrap/cache"]);
        self.run_step("permissions", permissions).await
    }

    async fn remove(&self, path: &Path) -> Result<(), InstallError> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "storefront removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(InstallError::filesystem(
                path.display().to_string(),
                e.to_string(),
            )),
        }
    }
}

/// [`StoreInstaller`] recording install activity in memory, for tests.
///
/// `fail_next_install`, `fail_next_headless`, and `fail_next_harden` each
/// script one failure, consumed by the next matching call.
#[derive(Debug, Default)]
pub struct InMemoryStoreInstaller {
    install_error: std::sync::Mutex<Option<InstallError>>,
    headless_error: std::sync::Mutex<Option<InstallError>>,
    harden_error: std::sync::Mutex<Option<InstallError>>,
    installed: std::sync::Mutex<Vec<InstallSpec>>,
    removed: std::sync::Mutex<Vec<PathBuf>>,
}

impl InMemoryStoreInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_install(&self, error: InstallError) {
        *self.install_error.lock().unwrap() = Some(error);
    }

    pub fn fail_next_headless(&self, error: InstallError) {
        *self.headless_error.lock().unwrap() = Some(error);
    }

    pub fn fail_next_harden(&self, error: InstallError) {
        *self.harden_error.lock().unwrap() = Some(error);
    }

    /// Install specs received so far, in order.
    pub fn installed(&self) -> Vec<InstallSpec> {
        self.installed.lock().unwrap().clone()
    }

    /// Paths removed so far, in order.
    pub fn removed(&self) -> Vec<PathBuf> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl StoreInstaller for InMemoryStoreInstaller {
    async fn install(&self, spec: &InstallSpec) -> Result<InstallReport, InstallError> {
        if let Some(error) = self.install_error.lock().unwrap().take() {
            return Err(error);
        }
        self.installed.lock().unwrap().push(spec.clone());
        Ok(InstallReport {
            version: "2.2.2".to_string(),
        })
    }

    async fn configure_headless(&self, _path: &Path) -> Result<(), InstallError> {
        match self.headless_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn harden(&self, _path: &Path) -> Result<(), InstallError> {
        match self.harden_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn remove(&self, path: &Path) -> Result<(), InstallError> {
        self.removed.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use secrecy::SecretString;

    use crate::domain::foundation::{CurrencyCode, TenantId};

    fn test_spec(path: PathBuf) -> InstallSpec {
        InstallSpec {
            tenant_id: TenantId::new(),
            path,
            app_url: "https://duka.vumashops.com".to_string(),
            db_name: "vumashops_abc123".to_string(),
            db_user: "vs_abc123".to_string(),
            db_password: SecretString::new("db-secret".to_string()),
            locale: "en".to_string(),
            timezone: "Africa/Nairobi".to_string(),
            currency: CurrencyCode::KES,
            admin_email: "owner@example.com".to_string(),
            admin_password: SecretString::new("one-time-password".to_string()),
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Environment File Tests
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn env_file_carries_tenant_database_and_market_settings() {
        let installer = BagistoInstaller::new("/opt/vumashops/template").with_db_host("10.0.0.5");
        let env = installer.render_env(&test_spec(PathBuf::from("/var/www/tenants/abc")));

        assert!(env.contains("APP_URL=https://duka.vumashops.com"));
        assert!(env.contains("APP_CURRENCY=KES"));
        assert!(env.contains("APP_TIMEZONE=Africa/Nairobi"));
        assert!(env.contains("DB_HOST=10.0.0.5"));
        assert!(env.contains("DB_DATABASE=vumashops_abc123"));
        assert!(env.contains("DB_USERNAME=vs_abc123"));
        assert!(env.contains("DB_PASSWORD=db-secret"));
    }

    #[test]
    fn env_file_leaves_app_key_for_key_generate() {
        let installer = BagistoInstaller::new("/opt/vumashops/template");
        let env = installer.render_env(&test_spec(PathBuf::from("/var/www/tenants/abc")));

        assert!(env.contains("APP_KEY=\n"));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Version Report Tests
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn version_is_read_from_composer_manifest() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(
            root.path().join("composer.json"),
            r#"{"require": {"bagisto/bagisto": "^2.1"}}"#,
        )
        .unwrap();

        let installer = BagistoInstaller::new("/opt/vumashops/template");
        assert_eq!(installer.installed_version(root.path()).await, "^2.1");
    }

    #[tokio::test]
    async fn missing_manifest_reports_unknown() {
        let root = tempfile::tempdir().unwrap();
        let installer = BagistoInstaller::new("/opt/vumashops/template");
        assert_eq!(installer.installed_version(root.path()).await, "unknown");
    }

    // ════════════════════════════════════════════════════════════════════════
    // Removal Tests
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn remove_deletes_the_tree() {
        let root = tempfile::tempdir().unwrap();
        let store = root.path().join("store");
        std::fs::create_dir_all(store.join("public")).unwrap();
        std::fs::write(store.join(".env"), "APP_KEY=").unwrap();

        let installer = BagistoInstaller::new("/opt/vumashops/template");
        installer.remove(&store).await.unwrap();

        assert!(!store.exists());
    }

    #[tokio::test]
    async fn remove_tolerates_absence() {
        let root = tempfile::tempdir().unwrap();
        let installer = BagistoInstaller::new("/opt/vumashops/template");

        installer.remove(&root.path().join("never-created")).await.unwrap();
    }

    // ════════════════════════════════════════════════════════════════════════
    // Availability Tests
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn missing_php_reports_unavailable() {
        let root = tempfile::tempdir().unwrap();
        let installer = BagistoInstaller::new("/opt/vumashops/template")
            .with_php_path("/nonexistent/php-definitely-missing");

        let err = installer
            .install(&test_spec(root.path().join("store")))
            .await
            .unwrap_err();

        assert!(matches!(err, InstallError::ToolUnavailable(_)));
    }
}
