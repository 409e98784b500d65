//! In-memory adapters for tests and single-node development.

mod domain_store;
mod notifications;
mod order_tracker;
mod payment_store;
mod reconciliation;
mod tenant_store;

pub use domain_store::InMemoryDomainStore;
pub use notifications::InMemoryNotificationSink;
pub use order_tracker::InMemoryOrderTracker;
pub use payment_store::InMemoryPaymentStore;
pub use reconciliation::InMemoryReconciliationAlerts;
pub use tenant_store::InMemoryTenantStore;
