//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, errors)
//! - `payment` - Payment collection lifecycle and gateway registry
//! - `tenant` - Merchant store lifecycle, domains, and certificates

pub mod foundation;
pub mod payment;
pub mod tenant;
