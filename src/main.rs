//! VumaShops platform server - application entry point.
//!
//! Loads configuration, connects the MySQL admin pool, builds the payment
//! manager and the provisioning pipeline from their adapters, and serves
//! the two HTTP surfaces (gateway webhooks, WHMCS billing API) on one
//! listener. A background task sweeps certificates due for renewal.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use http::HeaderName;
use sqlx::mysql::MySqlPoolOptions;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vumashops_core::adapters::http::{
    webhook_router, whmcs_router, WebhookAppState, WhmcsAppState,
};
use vumashops_core::adapters::memory::{
    InMemoryDomainStore, InMemoryNotificationSink, InMemoryOrderTracker, InMemoryPaymentStore,
    InMemoryReconciliationAlerts, InMemoryTenantStore,
};
use vumashops_core::adapters::provisioning::{
    BagistoInstaller, CertbotIssuer, HickoryDnsResolver, MySqlTenantDatabase,
    NginxConfigGenerator,
};
use vumashops_core::adapters::secrets::EnvelopeSecretStore;
use vumashops_core::application::{
    BagistoProvisioner, DnsVerifier, PaymentManager, SslManager, TenantLocks, WhmcsService,
};
use vumashops_core::config::AppConfig;

const RENEWAL_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.server.log_level))
        .json()
        .init();

    info!(
        environment = ?config.server.environment,
        base_domain = %config.provisioning.base_domain,
        "starting vumashops core"
    );

    let admin_pool = MySqlPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .idle_timeout(config.database.idle_timeout())
        .connect(&config.database.url)
        .await?;

    let tenants = Arc::new(InMemoryTenantStore::new());
    let domains = Arc::new(InMemoryDomainStore::new());
    let payments = Arc::new(InMemoryPaymentStore::new());
    let orders = Arc::new(InMemoryOrderTracker::new());
    let notifications = Arc::new(InMemoryNotificationSink::new());
    let alerts = Arc::new(InMemoryReconciliationAlerts::new());

    let manager = Arc::new(PaymentManager::from_config(
        &config.gateways,
        payments,
        orders,
        notifications.clone(),
        alerts,
    )?);

    let secrets = Arc::new(EnvelopeSecretStore::from_base64_key(
        &config.secrets.master_key,
    )?);
    let locks = TenantLocks::new();
    let installer = Arc::new(
        BagistoInstaller::new(config.provisioning.template_path.clone())
            .with_db_host(config.database.tenant_db_host.clone()),
    );
    let provisioner = Arc::new(BagistoProvisioner::new(
        tenants.clone(),
        Arc::new(MySqlTenantDatabase::new(admin_pool)),
        installer,
        secrets,
        locks.clone(),
        config.provisioning.tenants_root.clone(),
    ));

    let resolver = Arc::new(HickoryDnsResolver::from_system_conf()?);
    let verifier = DnsVerifier::new(resolver, config.provisioning.server_ipv4()?);
    let mut issuer = CertbotIssuer::new(config.provisioning.contact_email.clone());
    if !config.is_production() {
        issuer = issuer.staging();
    }
    let nginx = NginxConfigGenerator::new(
        config.provisioning.sites_available.clone(),
        config.provisioning.sites_enabled.clone(),
        config.provisioning.acme_webroot.clone(),
    )
    .with_php_fpm_socket(config.provisioning.php_fpm_socket.clone());
    let ssl = Arc::new(SslManager::new(
        tenants.clone(),
        verifier,
        Arc::new(issuer),
        nginx,
        locks,
        config.provisioning.acme_webroot.clone(),
    ));

    let sweeper = ssl.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RENEWAL_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            match sweeper.renew_due().await {
                Ok(renewed) if renewed > 0 => {
                    info!(renewed, "certificate renewal sweep finished");
                }
                Ok(_) => {}
                Err(sweep_error) => {
                    error!(error = %sweep_error, "certificate renewal sweep failed");
                }
            }
        }
    });

    let service = Arc::new(WhmcsService::new(
        tenants,
        domains,
        notifications,
        provisioner,
        ssl,
    ));

    let request_id = HeaderName::from_static("x-request-id");
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(webhook_router().with_state(WebhookAppState { manager }))
        .merge(whmcs_router(WhmcsAppState {
            service,
            api_key: config.whmcs.api_key.clone(),
        }))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.server.request_timeout_secs,
                ))),
        );

    let addr = config.server.socket_addr();
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
