//! Payment domain module.
//!
//! Handles the payment collection lifecycle across the supported gateways.
//!
//! # Module Structure
//!
//! - `payment` - Payment aggregate entity
//! - `status` - PaymentStatus state machine
//! - `gateway_id` - Closed registry of supported gateways
//! - `reference` - Platform payment reference value object

mod gateway_id;
mod payment;
mod reference;
mod status;

pub use gateway_id::GatewayId;
pub use payment::Payment;
pub use reference::PaymentReference;
pub use status::PaymentStatus;
