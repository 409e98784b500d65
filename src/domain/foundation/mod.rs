//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, and error types that form the
//! vocabulary of the VumaShops platform domain.

mod country;
mod errors;
mod ids;
mod money;
mod state_machine;
mod timestamp;

pub use country::CountryCode;
pub use errors::{TransitionError, ValidationError};
pub use ids::{DomainId, OrderId, PaymentId, TenantId};
pub use money::{CurrencyCode, Money};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
