//! Provisioning configuration
//!
//! Filesystem layout and platform identity used by the tenant bring-up
//! pipeline: where stores are installed, where the Bagisto template tree
//! lives, where nginx looks for vhosts, and the IP that DNS verification
//! expects domains to point at.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use super::error::ValidationError;

/// Tenant provisioning configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    /// Public IPv4 of the app server; custom domains must resolve here
    pub server_ip: String,

    /// ACME registration contact
    pub contact_email: String,

    /// Platform base domain for store subdomains
    #[serde(default = "default_base_domain")]
    pub base_domain: String,

    /// Root directory tenant stores are installed under
    #[serde(default = "default_tenants_root")]
    pub tenants_root: PathBuf,

    /// Pristine Bagisto tree copied for each new store
    #[serde(default = "default_template_path")]
    pub template_path: PathBuf,

    /// Webroot certbot serves HTTP-01 challenges from
    #[serde(default = "default_acme_webroot")]
    pub acme_webroot: PathBuf,

    /// Nginx sites-available directory
    #[serde(default = "default_sites_available")]
    pub sites_available: PathBuf,

    /// Nginx sites-enabled directory
    #[serde(default = "default_sites_enabled")]
    pub sites_enabled: PathBuf,

    /// PHP-FPM socket the rendered vhosts hand PHP requests to
    #[serde(default = "default_php_fpm_socket")]
    pub php_fpm_socket: String,
}

impl ProvisioningConfig {
    /// The server IP as a typed address.
    pub fn server_ipv4(&self) -> Result<Ipv4Addr, ValidationError> {
        self.server_ip
            .parse()
            .map_err(|_| ValidationError::InvalidServerIp)
    }

    /// Validate provisioning configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.server_ip.is_empty() {
            return Err(ValidationError::MissingRequired("PROVISIONING_SERVER_IP"));
        }
        self.server_ipv4()?;

        if self.contact_email.is_empty() {
            return Err(ValidationError::MissingRequired(
                "PROVISIONING_CONTACT_EMAIL",
            ));
        }
        let (local, domain) = self
            .contact_email
            .split_once('@')
            .ok_or(ValidationError::InvalidContactEmail)?;
        if local.is_empty() || !domain.contains('.') {
            return Err(ValidationError::InvalidContactEmail);
        }

        if self.base_domain.is_empty()
            || self.base_domain.contains('/')
            || self.base_domain.contains("://")
        {
            return Err(ValidationError::InvalidBaseDomain);
        }
        Ok(())
    }
}

fn default_base_domain() -> String {
    "vumashops.com".to_string()
}

fn default_tenants_root() -> PathBuf {
    PathBuf::from("/var/www/tenants")
}

fn default_template_path() -> PathBuf {
    PathBuf::from("/opt/vumashops/bagisto-template")
}

fn default_acme_webroot() -> PathBuf {
    PathBuf::from("/var/www/letsencrypt")
}

fn default_sites_available() -> PathBuf {
    PathBuf::from("/etc/nginx/sites-available")
}

fn default_sites_enabled() -> PathBuf {
    PathBuf::from("/etc/nginx/sites-enabled")
}

fn default_php_fpm_socket() -> String {
    "/var/run/php/php8.2-fpm.sock".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ProvisioningConfig {
        ProvisioningConfig {
            server_ip: "41.90.12.7".to_string(),
            contact_email: "ops@vumashops.com".to_string(),
            base_domain: default_base_domain(),
            tenants_root: default_tenants_root(),
            template_path: default_template_path(),
            acme_webroot: default_acme_webroot(),
            sites_available: default_sites_available(),
            sites_enabled: default_sites_enabled(),
            php_fpm_socket: default_php_fpm_socket(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid().validate().is_ok());
        assert_eq!(valid().server_ipv4().unwrap(), Ipv4Addr::new(41, 90, 12, 7));
    }

    #[test]
    fn test_garbage_server_ip_is_rejected() {
        let mut config = valid();
        config.server_ip = "not-an-ip".to_string();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidServerIp)
        ));
    }

    #[test]
    fn test_bad_contact_email_is_rejected() {
        let mut config = valid();
        config.contact_email = "ops-at-vumashops".to_string();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidContactEmail)
        ));
    }

    #[test]
    fn test_base_domain_must_be_bare() {
        let mut config = valid();
        config.base_domain = "https://vumashops.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidBaseDomain)
        ));
    }
}
