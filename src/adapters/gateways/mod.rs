//! Payment gateway driver implementations.
//!
//! One file per provider. Each driver owns its provider's wire protocol:
//! authentication, amount units, phone normalization, webhook verification,
//! and the mapping from provider status codes onto [`GatewayStatus`].
//!
//! [`GatewayStatus`]: crate::ports::GatewayStatus

pub mod airtel_money;
pub mod flutterwave;
pub mod mock;
pub mod mpesa_kenya;
pub mod mpesa_tanzania;
pub mod mtn_momo;
pub mod paystack;
pub mod token_cache;

pub use airtel_money::{AirtelConfig, AirtelMoneyAdapter};
pub use flutterwave::{FlutterwaveAdapter, FlutterwaveConfig};
pub use mock::MockGateway;
pub use mpesa_kenya::{MpesaDisbursementConfig, MpesaKenyaAdapter, MpesaKenyaConfig};
pub use mpesa_tanzania::{MpesaTanzaniaAdapter, MpesaTanzaniaConfig};
pub use mtn_momo::{MtnMomoAdapter, MtnMomoConfig, MtnProductConfig};
pub use paystack::{PaystackAdapter, PaystackConfig};
pub use token_cache::{BearerTokenCache, FetchedToken};

use crate::domain::payment::GatewayId;
use crate::ports::GatewayError;

/// Maps a reqwest transport failure onto the retryable gateway errors.
pub(crate) fn transport_error(gateway: GatewayId, err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout { gateway }
    } else {
        GatewayError::network(gateway, err.to_string())
    }
}
