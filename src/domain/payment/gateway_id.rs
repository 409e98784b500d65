//! GatewayId enum naming the supported payment gateways.
//!
//! The set of gateways is closed at compile time. Adding a provider means
//! adding a variant here and wiring its driver into `PaymentManager`, so an
//! unknown identifier can never reach driver construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// The supported payment gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayId {
    Paystack,
    Flutterwave,
    MpesaKenya,
    MpesaTanzania,
    MtnMomo,
    AirtelMoney,
}

impl GatewayId {
    /// Returns all gateway ids in registry order.
    pub fn all() -> &'static [GatewayId] {
        &[
            GatewayId::Paystack,
            GatewayId::Flutterwave,
            GatewayId::MpesaKenya,
            GatewayId::MpesaTanzania,
            GatewayId::MtnMomo,
            GatewayId::AirtelMoney,
        ]
    }

    /// Stable wire identifier used in URLs, config keys, and stored records.
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayId::Paystack => "paystack",
            GatewayId::Flutterwave => "flutterwave",
            GatewayId::MpesaKenya => "mpesa_kenya",
            GatewayId::MpesaTanzania => "mpesa_tanzania",
            GatewayId::MtnMomo => "mtn_momo",
            GatewayId::AirtelMoney => "airtel_money",
        }
    }

    /// Returns the human-readable name shown to merchants.
    pub fn display_name(&self) -> &'static str {
        match self {
            GatewayId::Paystack => "Paystack",
            GatewayId::Flutterwave => "Flutterwave",
            GatewayId::MpesaKenya => "M-Pesa Kenya",
            GatewayId::MpesaTanzania => "M-Pesa Tanzania",
            GatewayId::MtnMomo => "MTN Mobile Money",
            GatewayId::AirtelMoney => "Airtel Money",
        }
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GatewayId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paystack" => Ok(GatewayId::Paystack),
            "flutterwave" => Ok(GatewayId::Flutterwave),
            "mpesa_kenya" => Ok(GatewayId::MpesaKenya),
            "mpesa_tanzania" => Ok(GatewayId::MpesaTanzania),
            "mtn_momo" => Ok(GatewayId::MtnMomo),
            "airtel_money" => Ok(GatewayId::AirtelMoney),
            _ => Err(ValidationError::invalid_format(
                "gateway",
                format!("unknown gateway '{s}'"),
            )),
        }
    }
}
