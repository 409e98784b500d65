//! VumaShops Core - Payment Orchestration and Tenant Provisioning
//!
//! This crate implements the platform core behind VumaShops storefronts:
//! a gateway-agnostic payment layer for African mobile money and card
//! providers, and the provisioning pipeline that turns a signup into a
//! running, TLS-terminated store.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
