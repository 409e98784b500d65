//! Payment orchestration across the gateway fleet.
//!
//! `PaymentManager` owns the driver registry and is the only write path
//! for [`Payment`] records. Driver failures stop at this boundary: every
//! public operation logs the error with context and returns a caller-safe
//! outcome, so a provider outage degrades checkout instead of breaking it.
//!
//! Status reconciliation is idempotent. A verify call and a webhook for
//! the same payment may race; whichever lands second finds the payment
//! already completed and changes nothing, and merchant notifications fire
//! exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::adapters::gateways::{
    AirtelConfig, AirtelMoneyAdapter, FlutterwaveAdapter, FlutterwaveConfig,
    MpesaDisbursementConfig, MpesaKenyaAdapter, MpesaKenyaConfig, MpesaTanzaniaAdapter,
    MpesaTanzaniaConfig, MtnMomoAdapter, MtnMomoConfig, MtnProductConfig, PaystackAdapter,
    PaystackConfig,
};
use crate::config::{ConfigError, GatewaysConfig, ValidationError};
use crate::domain::foundation::{Money, OrderId, PaymentId, TenantId, Timestamp};
use crate::domain::payment::{GatewayId, Payment, PaymentReference};
use crate::domain::tenant::TenantContext;
use crate::ports::{
    GatewayDriver, GatewayStatus, InitiateRequest, NextAction, Notification, NotificationSink,
    OrderTracker, PaymentStore, ReconciliationAlerts, ReconciliationGap, RefundRequest, StoreError,
    VerifyRequest, WebhookDelivery,
};

/// Generic decline shown to customers. Raw provider payloads stay in the
/// logs and the stored `gateway_payload`, never in user-facing messages.
const DECLINED_MESSAGE: &str = "Payment request failed, please try again";

/// Generic refund failure shown to operators.
const REFUND_FAILED_MESSAGE: &str = "Refund request failed, please try again";

/// Gateway preference per market. The first entry that is both registered
/// and available wins.
static COUNTRY_PRIORITY: Lazy<HashMap<&'static str, &'static [GatewayId]>> = Lazy::new(|| {
    use GatewayId::*;
    HashMap::from([
        ("KE", &[MpesaKenya, Paystack, Flutterwave] as &'static [GatewayId]),
        ("TZ", &[MpesaTanzania, AirtelMoney, Flutterwave]),
        ("UG", &[MtnMomo, AirtelMoney, Flutterwave]),
        ("RW", &[MtnMomo, AirtelMoney, Flutterwave]),
        ("GH", &[MtnMomo, Paystack, Flutterwave]),
        ("NG", &[Paystack, Flutterwave]),
        ("ZA", &[Paystack, Flutterwave]),
        ("ZM", &[AirtelMoney, MtnMomo, Flutterwave]),
        ("MW", &[AirtelMoney, Flutterwave]),
    ])
});

/// Tried when the tenant's country has no dedicated priority row.
static GLOBAL_FALLBACK: &[GatewayId] = &[GatewayId::Flutterwave, GatewayId::Paystack];

/// A storefront checkout attempt, before any gateway is involved.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub amount: Money,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub callback_url: String,
    pub metadata: HashMap<String, String>,
}

/// Caller-safe result of `initialize_payment`.
#[derive(Debug, Clone, Serialize)]
pub struct InitiatedPayment {
    pub success: bool,

    /// Platform reference of the persisted pending payment.
    pub reference: Option<PaymentReference>,

    /// What the storefront must do next (redirect, show STK instructions).
    pub next_action: Option<NextAction>,

    pub message: Option<String>,
}

impl InitiatedPayment {
    fn accepted(reference: PaymentReference, next_action: NextAction) -> Self {
        Self {
            success: true,
            reference: Some(reference),
            next_action: Some(next_action),
            message: None,
        }
    }

    fn declined(message: impl Into<String>) -> Self {
        Self {
            success: false,
            reference: None,
            next_action: None,
            message: Some(message.into()),
        }
    }
}

/// Caller-safe result of `verify_payment`.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    /// True once the payment is confirmed as completed.
    pub success: bool,

    /// Normalized gateway state, `Unknown` when the query itself failed.
    pub status: GatewayStatus,

    pub reference: PaymentReference,

    pub message: Option<String>,
}

/// What a webhook did. The HTTP layer acknowledges the delivery either
/// way; this is for logging and tests.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    /// True when the event matched a stored payment.
    pub matched: bool,

    /// Normalized state carried by the event, `Unknown` when the payload
    /// was rejected.
    pub status: GatewayStatus,
}

/// Caller-safe result of `refund_payment`.
#[derive(Debug, Clone, Serialize)]
pub struct RefundResult {
    pub success: bool,

    /// Provider's reference for the refund transaction.
    pub refund_reference: Option<String>,

    /// True when the money went back as a reverse payout rather than a
    /// true reversal.
    pub via_disbursement: bool,

    pub message: Option<String>,
}

impl RefundResult {
    fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            refund_reference: None,
            via_disbursement: false,
            message: Some(message.into()),
        }
    }
}

/// Registry and dispatcher over the configured gateway drivers.
pub struct PaymentManager {
    drivers: HashMap<GatewayId, Arc<dyn GatewayDriver>>,
    payments: Arc<dyn PaymentStore>,
    orders: Arc<dyn OrderTracker>,
    notifications: Arc<dyn NotificationSink>,
    alerts: Arc<dyn ReconciliationAlerts>,
}

impl PaymentManager {
    /// Creates a manager with an empty driver registry.
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        orders: Arc<dyn OrderTracker>,
        notifications: Arc<dyn NotificationSink>,
        alerts: Arc<dyn ReconciliationAlerts>,
    ) -> Self {
        Self {
            drivers: HashMap::new(),
            payments,
            orders,
            notifications,
            alerts,
        }
    }

    /// Builds a manager from configuration, constructing one driver per
    /// enabled gateway.
    ///
    /// An enabled gateway with incomplete credentials fails here, at
    /// startup, never at request time.
    pub fn from_config(
        config: &GatewaysConfig,
        payments: Arc<dyn PaymentStore>,
        orders: Arc<dyn OrderTracker>,
        notifications: Arc<dyn NotificationSink>,
        alerts: Arc<dyn ReconciliationAlerts>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut manager = Self::new(payments, orders, notifications, alerts);

        if config.paystack.enabled {
            let secret = require(&config.paystack.secret_key, "PAYSTACK_SECRET_KEY")?;
            manager.register(Arc::new(PaystackAdapter::new(PaystackConfig::new(secret))));
        }

        if config.flutterwave.enabled {
            let secret = require(&config.flutterwave.secret_key, "FLUTTERWAVE_SECRET_KEY")?;
            let hash = require(&config.flutterwave.webhook_hash, "FLUTTERWAVE_WEBHOOK_HASH")?;
            manager.register(Arc::new(FlutterwaveAdapter::new(FlutterwaveConfig::new(
                secret, hash,
            ))));
        }

        if config.mpesa_kenya.enabled {
            let settings = &config.mpesa_kenya;
            let mut daraja = MpesaKenyaConfig::new(
                require(&settings.consumer_key, "MPESA_KE_CONSUMER_KEY")?,
                require(&settings.consumer_secret, "MPESA_KE_CONSUMER_SECRET")?,
                require_plain(&settings.shortcode, "MPESA_KE_SHORTCODE")?,
                require(&settings.passkey, "MPESA_KE_PASSKEY")?,
            );
            if settings.has_disbursement() {
                daraja = daraja.with_disbursement(MpesaDisbursementConfig::new(
                    require_plain(&settings.initiator_name, "MPESA_KE_INITIATOR_NAME")?,
                    require(&settings.security_credential, "MPESA_KE_SECURITY_CREDENTIAL")?,
                    require_plain(&settings.result_url, "MPESA_KE_RESULT_URL")?,
                ));
            }
            manager.register(Arc::new(MpesaKenyaAdapter::new(daraja)));
        }

        if config.mpesa_tanzania.enabled {
            let settings = &config.mpesa_tanzania;
            manager.register(Arc::new(MpesaTanzaniaAdapter::new(MpesaTanzaniaConfig::new(
                require(&settings.api_key, "MPESA_TZ_API_KEY")?,
                require_plain(
                    &settings.service_provider_code,
                    "MPESA_TZ_SERVICE_PROVIDER_CODE",
                )?,
            ))));
        }

        if config.mtn_momo.enabled {
            let settings = &config.mtn_momo;
            let collection = MtnProductConfig::new(
                require(&settings.subscription_key, "MTN_MOMO_SUBSCRIPTION_KEY")?,
                require_plain(&settings.api_user, "MTN_MOMO_API_USER")?,
                require(&settings.api_key, "MTN_MOMO_API_KEY")?,
            );
            let mut momo = MtnMomoConfig::new(
                collection,
                settings.target_environment.as_str(),
                settings.msisdn_prefix.as_str(),
            );
            if settings.has_disbursement() {
                momo = momo.with_disbursement(MtnProductConfig::new(
                    require(
                        &settings.disbursement_subscription_key,
                        "MTN_MOMO_DISBURSEMENT_SUBSCRIPTION_KEY",
                    )?,
                    require_plain(
                        &settings.disbursement_api_user,
                        "MTN_MOMO_DISBURSEMENT_API_USER",
                    )?,
                    require(&settings.disbursement_api_key, "MTN_MOMO_DISBURSEMENT_API_KEY")?,
                ));
            }
            manager.register(Arc::new(MtnMomoAdapter::new(momo)));
        }

        if config.airtel_money.enabled {
            let settings = &config.airtel_money;
            let mut airtel = AirtelConfig::new(
                require_plain(&settings.client_id, "AIRTEL_CLIENT_ID")?,
                require(&settings.client_secret, "AIRTEL_CLIENT_SECRET")?,
                require_plain(&settings.country, "AIRTEL_COUNTRY")?,
                require_plain(&settings.currency, "AIRTEL_CURRENCY")?,
                require_plain(&settings.dialing_prefix, "AIRTEL_DIALING_PREFIX")?,
            );
            if let Some(pin) = &settings.disbursement_pin {
                airtel = airtel.with_disbursement_pin(pin.expose_secret().as_str());
            }
            manager.register(Arc::new(AirtelMoneyAdapter::new(airtel)));
        }

        info!(
            gateways = ?manager.registered_gateways(),
            "payment manager initialized"
        );
        Ok(manager)
    }

    /// Registers a driver, replacing any existing driver for the same
    /// gateway.
    pub fn register(&mut self, driver: Arc<dyn GatewayDriver>) {
        self.drivers.insert(driver.id(), driver);
    }

    /// True when a driver is registered for the gateway.
    pub fn is_registered(&self, gateway: GatewayId) -> bool {
        self.drivers.contains_key(&gateway)
    }

    /// Registered gateways in registry order.
    pub fn registered_gateways(&self) -> Vec<GatewayId> {
        GatewayId::all()
            .iter()
            .copied()
            .filter(|id| self.drivers.contains_key(id))
            .collect()
    }

    /// Gateways a tenant's customers can actually pay with.
    pub fn gateways_for_location(&self, context: &TenantContext) -> Vec<GatewayId> {
        GatewayId::all()
            .iter()
            .copied()
            .filter(|id| {
                self.drivers
                    .get(id)
                    .map(|driver| driver.is_available(&context.country, context.currency))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// The gateway checkout should preselect for this tenant, if any.
    pub fn recommended_gateway(&self, context: &TenantContext) -> Option<GatewayId> {
        let priority = COUNTRY_PRIORITY
            .get(context.country.as_str())
            .copied()
            .unwrap_or(GLOBAL_FALLBACK);

        priority
            .iter()
            .chain(GLOBAL_FALLBACK.iter())
            .copied()
            .find(|id| {
                self.drivers
                    .get(id)
                    .map(|driver| driver.is_available(&context.country, context.currency))
                    .unwrap_or(false)
            })
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Collection
    // ════════════════════════════════════════════════════════════════════════════

    /// Starts a collection with the given gateway.
    ///
    /// On gateway acceptance the pending [`Payment`] is persisted; this is
    /// the only path that creates payment records. Gateway-side failures
    /// come back as a declined outcome with no row written.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` only when persisting the accepted payment
    /// fails.
    pub async fn initialize_payment(
        &self,
        gateway: GatewayId,
        checkout: CheckoutRequest,
    ) -> Result<InitiatedPayment, StoreError> {
        let Some(driver) = self.drivers.get(&gateway) else {
            warn!(%gateway, "checkout refused: gateway not configured");
            return Ok(InitiatedPayment::declined(format!(
                "{} is not available on this store",
                gateway.display_name()
            )));
        };

        // Below-minimum amounts never reach the network.
        if let Err(err) = driver.check_minimum(&checkout.amount) {
            return Ok(InitiatedPayment::declined(err.to_string()));
        }

        let mut payment = Payment::create(
            checkout.tenant_id,
            checkout.order_id,
            gateway,
            checkout.amount,
        );
        payment.customer_email = checkout.customer_email.clone();
        payment.customer_phone = checkout.customer_phone.clone();

        let request = InitiateRequest {
            tenant_id: checkout.tenant_id,
            order_id: checkout.order_id,
            reference: payment.reference.clone(),
            amount: checkout.amount,
            customer_email: checkout.customer_email,
            customer_phone: checkout.customer_phone,
            callback_url: checkout.callback_url,
            metadata: checkout.metadata,
        };

        match driver.initialize(request).await {
            Ok(outcome) => {
                payment.gateway_reference = outcome.gateway_reference;
                self.payments.save(&payment).await?;
                info!(
                    %gateway,
                    reference = %payment.reference,
                    amount = %payment.amount,
                    "payment initialized"
                );
                Ok(InitiatedPayment::accepted(
                    payment.reference,
                    outcome.next_action,
                ))
            }
            Err(err) => {
                error!(
                    %gateway,
                    reference = %payment.reference,
                    error = %err,
                    retryable = err.is_retryable(),
                    "payment initialization failed"
                );
                Ok(InitiatedPayment::declined(DECLINED_MESSAGE))
            }
        }
    }

    /// Queries the gateway for the authoritative state of a payment and
    /// reconciles the stored record.
    ///
    /// Already-settled payments return immediately without a network call.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` only on persistence failures; gateway errors
    /// come back as an unsuccessful result with the payment untouched.
    pub async fn verify_payment(
        &self,
        gateway: GatewayId,
        reference: &PaymentReference,
    ) -> Result<VerificationResult, StoreError> {
        let Some(mut payment) = self.payments.find_by_reference(reference).await? else {
            warn!(%gateway, %reference, "verification requested for unknown reference");
            return Ok(VerificationResult {
                success: false,
                status: GatewayStatus::Unknown,
                reference: reference.clone(),
                message: Some("no payment with this reference".to_string()),
            });
        };

        if payment.gateway != gateway {
            warn!(
                requested = %gateway,
                actual = %payment.gateway,
                %reference,
                "verification requested against the wrong gateway"
            );
            return Ok(VerificationResult {
                success: false,
                status: GatewayStatus::Unknown,
                reference: reference.clone(),
                message: Some("reference belongs to a different gateway".to_string()),
            });
        }

        if payment.status.is_settled() {
            return Ok(VerificationResult {
                success: true,
                status: GatewayStatus::Success,
                reference: reference.clone(),
                message: Some("payment already settled".to_string()),
            });
        }

        let Some(driver) = self.drivers.get(&gateway) else {
            warn!(%gateway, %reference, "verification refused: gateway not configured");
            return Ok(VerificationResult {
                success: false,
                status: GatewayStatus::Unknown,
                reference: reference.clone(),
                message: Some(format!("{} is not available", gateway.display_name())),
            });
        };

        let outcome = match driver
            .verify(VerifyRequest {
                reference: payment.reference.clone(),
                gateway_reference: payment.gateway_reference.clone(),
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    %gateway,
                    %reference,
                    error = %err,
                    retryable = err.is_retryable(),
                    "verification query failed"
                );
                return Ok(VerificationResult {
                    success: false,
                    status: GatewayStatus::Unknown,
                    reference: reference.clone(),
                    message: Some(DECLINED_MESSAGE.to_string()),
                });
            }
        };

        if let Some(reported) = outcome.amount {
            if reported != payment.amount {
                warn!(
                    %reference,
                    expected = %payment.amount,
                    reported = %reported,
                    "gateway reported a different amount than requested"
                );
            }
        }
        if payment.gateway_reference.is_none() {
            payment.gateway_reference = outcome.gateway_reference.clone();
        }

        self.apply_gateway_status(&mut payment, outcome.status, outcome.message.as_deref(), &outcome.raw)
            .await?;

        Ok(VerificationResult {
            success: payment.is_completed(),
            status: outcome.status,
            reference: reference.clone(),
            message: outcome.message,
        })
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Webhooks
    // ════════════════════════════════════════════════════════════════════════════

    /// Processes one inbound provider webhook.
    ///
    /// Never fails: signature rejections, unmatched references, and store
    /// outages are logged (unmatched references additionally raise a
    /// reconciliation gap) and the delivery is acknowledged so providers
    /// do not enter retry storms.
    pub async fn handle_webhook(&self, gateway: GatewayId, delivery: WebhookDelivery) -> WebhookAck {
        let digest = payload_digest(delivery.body());

        let Some(driver) = self.drivers.get(&gateway) else {
            warn!(%gateway, digest, "webhook for unconfigured gateway");
            self.record_gap(ReconciliationGap {
                gateway,
                reference: None,
                gateway_reference: None,
                reason: "webhook received for a gateway with no configured driver".to_string(),
                payload_digest: digest,
                observed_at: Timestamp::now(),
            })
            .await;
            return WebhookAck {
                matched: false,
                status: GatewayStatus::Unknown,
            };
        };

        let outcome = match driver.handle_webhook(delivery).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(%gateway, digest, error = %err, "webhook rejected");
                return WebhookAck {
                    matched: false,
                    status: GatewayStatus::Unknown,
                };
            }
        };

        let payment = match self
            .find_webhook_payment(outcome.reference.as_ref(), outcome.gateway_reference.as_deref())
            .await
        {
            Ok(found) => found,
            Err(err) => {
                error!(%gateway, digest, error = %err, "webhook lookup failed, delivery dropped");
                return WebhookAck {
                    matched: false,
                    status: outcome.status,
                };
            }
        };

        let Some(mut payment) = payment else {
            warn!(
                %gateway,
                reference = ?outcome.reference,
                gateway_reference = ?outcome.gateway_reference,
                digest,
                "webhook matched no payment"
            );
            self.record_gap(ReconciliationGap {
                gateway,
                reference: outcome.reference.map(|r| r.to_string()),
                gateway_reference: outcome.gateway_reference,
                reason: "webhook references matched no stored payment".to_string(),
                payload_digest: digest,
                observed_at: Timestamp::now(),
            })
            .await;
            return WebhookAck {
                matched: false,
                status: outcome.status,
            };
        };

        if payment.gateway_reference.is_none() {
            payment.gateway_reference = outcome.gateway_reference.clone();
        }

        if let Err(err) = self
            .apply_gateway_status(&mut payment, outcome.status, None, &outcome.raw)
            .await
        {
            error!(
                %gateway,
                reference = %payment.reference,
                error = %err,
                "webhook state could not be persisted"
            );
        } else {
            info!(
                %gateway,
                reference = %payment.reference,
                status = %outcome.status,
                "webhook applied"
            );
        }

        WebhookAck {
            matched: true,
            status: outcome.status,
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Refunds
    // ════════════════════════════════════════════════════════════════════════════

    /// Returns funds for a completed payment.
    ///
    /// Drivers without refund support produce an explicit refusal. On
    /// acceptance the payment transitions to refunded; payout-backed
    /// refunds (M-Pesa Kenya, MTN, Airtel) settle asynchronously and
    /// acceptance of the payout request counts as refunded here.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the payment cannot be loaded or the
    /// transition cannot be persisted.
    pub async fn refund_payment(
        &self,
        payment_id: &PaymentId,
        amount: Option<Money>,
        reason: Option<String>,
    ) -> Result<RefundResult, StoreError> {
        let Some(mut payment) = self.payments.find_by_id(payment_id).await? else {
            return Err(StoreError::not_found("Payment", payment_id));
        };

        if !payment.is_completed() {
            return Ok(RefundResult::refused(format!(
                "only completed payments can be refunded, this one is {:?}",
                payment.status
            )));
        }

        let Some(driver) = self.drivers.get(&payment.gateway) else {
            warn!(gateway = %payment.gateway, reference = %payment.reference, "refund refused: gateway not configured");
            return Ok(RefundResult::refused(format!(
                "{} is not available",
                payment.gateway.display_name()
            )));
        };

        if !driver.supports_refunds() {
            return Ok(RefundResult::refused(format!(
                "{} does not support refunds",
                driver.display_name()
            )));
        }

        let request = RefundRequest {
            reference: payment.reference.clone(),
            gateway_reference: payment.gateway_reference.clone(),
            amount,
            customer_phone: payment.customer_phone.clone(),
            reason,
        };

        let outcome = match driver.refund(request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    gateway = %payment.gateway,
                    reference = %payment.reference,
                    error = %err,
                    retryable = err.is_retryable(),
                    "refund request failed"
                );
                return Ok(RefundResult::refused(REFUND_FAILED_MESSAGE));
            }
        };

        match outcome.status {
            GatewayStatus::Success | GatewayStatus::Pending => {
                if let Err(err) = payment.refund() {
                    error!(reference = %payment.reference, error = %err, "refund accepted but payment cannot transition");
                    return Ok(RefundResult::refused(REFUND_FAILED_MESSAGE));
                }
                self.payments.update(&payment).await?;

                if let Err(err) = self
                    .orders
                    .mark_refunded(&payment.order_id, &payment.id)
                    .await
                {
                    warn!(order = %payment.order_id, error = %err, "order could not be marked refunded");
                }
                let refunded = amount.unwrap_or(payment.amount);
                if let Err(err) = self
                    .notifications
                    .deliver(Notification::PaymentRefunded {
                        tenant_id: payment.tenant_id,
                        reference: payment.reference.clone(),
                        amount: refunded,
                    })
                    .await
                {
                    warn!(reference = %payment.reference, error = %err, "refund notification not delivered");
                }

                info!(
                    gateway = %payment.gateway,
                    reference = %payment.reference,
                    via_disbursement = outcome.via_disbursement,
                    "refund accepted"
                );
                Ok(RefundResult {
                    success: true,
                    refund_reference: outcome.refund_reference,
                    via_disbursement: outcome.via_disbursement,
                    message: None,
                })
            }
            GatewayStatus::Failed | GatewayStatus::Unknown => {
                warn!(
                    gateway = %payment.gateway,
                    reference = %payment.reference,
                    status = %outcome.status,
                    "refund not accepted by gateway"
                );
                Ok(RefundResult::refused(REFUND_FAILED_MESSAGE))
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    /// Applies a gateway-reported status to a stored payment.
    ///
    /// Completions are idempotent; the settlement side effects (order
    /// marked paid, merchant notified) run only on the first one.
    async fn apply_gateway_status(
        &self,
        payment: &mut Payment,
        status: GatewayStatus,
        message: Option<&str>,
        raw: &serde_json::Value,
    ) -> Result<(), StoreError> {
        match status {
            GatewayStatus::Success => {
                let first_completion = !payment.is_completed();
                if let Err(err) = payment.complete(Some(raw.clone())) {
                    error!(
                        reference = %payment.reference,
                        status = ?payment.status,
                        error = %err,
                        "gateway confirmed a payment that cannot complete locally"
                    );
                    return Ok(());
                }
                self.payments.update(payment).await?;
                if first_completion {
                    self.settle(payment).await;
                }
            }
            GatewayStatus::Failed => {
                let reason = message.unwrap_or("gateway reported failure");
                if let Err(err) = payment.fail(reason) {
                    // A late failure event never regresses a settled payment.
                    warn!(
                        reference = %payment.reference,
                        status = ?payment.status,
                        error = %err,
                        "failure event ignored for settled payment"
                    );
                    return Ok(());
                }
                self.payments.update(payment).await?;
            }
            GatewayStatus::Pending | GatewayStatus::Unknown => {}
        }
        Ok(())
    }

    /// Settlement side effects, both best-effort.
    async fn settle(&self, payment: &Payment) {
        if let Err(err) = self.orders.mark_paid(&payment.order_id, &payment.id).await {
            warn!(order = %payment.order_id, error = %err, "order could not be marked paid");
        }
        if let Err(err) = self
            .notifications
            .deliver(Notification::PaymentReceived {
                tenant_id: payment.tenant_id,
                reference: payment.reference.clone(),
                amount: payment.amount,
            })
            .await
        {
            warn!(reference = %payment.reference, error = %err, "payment notification not delivered");
        }
    }

    /// Looks up the payment a webhook refers to, by platform reference
    /// first, then by the provider's own reference.
    async fn find_webhook_payment(
        &self,
        reference: Option<&PaymentReference>,
        gateway_reference: Option<&str>,
    ) -> Result<Option<Payment>, StoreError> {
        if let Some(reference) = reference {
            if let Some(payment) = self.payments.find_by_reference(reference).await? {
                return Ok(Some(payment));
            }
        }
        if let Some(gateway_reference) = gateway_reference {
            if let Some(payment) = self
                .payments
                .find_by_gateway_reference(gateway_reference)
                .await?
            {
                return Ok(Some(payment));
            }
        }
        Ok(None)
    }

    /// Records a reconciliation gap, logging if even that fails.
    async fn record_gap(&self, gap: ReconciliationGap) {
        if let Err(err) = self.alerts.record(gap).await {
            error!(error = %err, "reconciliation gap could not be recorded");
        }
    }
}

/// Resolves a required secret, surfacing the missing variable by name.
fn require<'a>(
    secret: &'a Option<SecretString>,
    name: &'static str,
) -> Result<&'a str, ValidationError> {
    secret
        .as_ref()
        .map(|s| s.expose_secret().as_str())
        .ok_or(ValidationError::MissingRequired(name))
}

/// Resolves a required plain setting, surfacing the missing variable by
/// name.
fn require_plain<'a>(
    value: &'a Option<String>,
    name: &'static str,
) -> Result<&'a str, ValidationError> {
    value
        .as_deref()
        .ok_or(ValidationError::MissingRequired(name))
}

/// SHA-256 hex digest of a webhook body, stable key for gap triage.
fn payload_digest(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
