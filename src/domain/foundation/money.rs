//! Money and currency types.
//!
//! Amounts are carried as exact decimals in major units (the form merchants
//! and customers see). Gateway adapters convert to whatever unit their wire
//! protocol wants: integer minor units, integer major units, or a decimal
//! string.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// Currency codes (ISO 4217) accepted across the supported gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurrencyCode {
    /// Nigerian naira
    NGN,
    /// Ghanaian cedi
    GHS,
    /// South African rand
    ZAR,
    /// Kenyan shilling
    KES,
    /// Tanzanian shilling
    TZS,
    /// Ugandan shilling
    UGX,
    /// Rwandan franc
    RWF,
    /// Zambian kwacha
    ZMW,
    /// Malawian kwacha
    MWK,
    /// Central African CFA franc
    XAF,
    /// West African CFA franc
    XOF,
}

impl CurrencyCode {
    /// Get currency code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NGN => "NGN",
            Self::GHS => "GHS",
            Self::ZAR => "ZAR",
            Self::KES => "KES",
            Self::TZS => "TZS",
            Self::UGX => "UGX",
            Self::RWF => "RWF",
            Self::ZMW => "ZMW",
            Self::MWK => "MWK",
            Self::XAF => "XAF",
            Self::XOF => "XOF",
        }
    }

    /// Get decimal places (0 for zero-decimal currencies).
    pub fn decimals(&self) -> u32 {
        match self {
            Self::UGX | Self::RWF | Self::XAF | Self::XOF => 0,
            _ => 2,
        }
    }

    /// Is a zero-decimal currency.
    pub fn is_zero_decimal(&self) -> bool {
        self.decimals() == 0
    }

    /// Parse from string.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_uppercase().as_str() {
            "NGN" => Some(Self::NGN),
            "GHS" => Some(Self::GHS),
            "ZAR" => Some(Self::ZAR),
            "KES" => Some(Self::KES),
            "TZS" => Some(Self::TZS),
            "UGX" => Some(Self::UGX),
            "RWF" => Some(Self::RWF),
            "ZMW" => Some(Self::ZMW),
            "MWK" => Some(Self::MWK),
            "XAF" => Some(Self::XAF),
            "XOF" => Some(Self::XOF),
            _ => None,
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s)
            .ok_or_else(|| ValidationError::invalid_format("currency", format!("unknown code '{s}'")))
    }
}

/// Money amount with currency, in major units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: CurrencyCode,
}

impl Money {
    /// Creates a money amount, rejecting negative values.
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Result<Self, ValidationError> {
        if amount.is_sign_negative() {
            return Err(ValidationError::invalid_format(
                "amount",
                "must not be negative",
            ));
        }
        Ok(Self { amount, currency })
    }

    /// Amount in major units.
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// The currency.
    pub fn currency(&self) -> CurrencyCode {
        self.currency
    }

    /// Amount in the smallest currency unit, rounded half-up.
    ///
    /// KES 500.00 becomes 50000; zero-decimal currencies pass through.
    pub fn minor_units(&self) -> i64 {
        let multiplier = Decimal::from(10i64.pow(self.currency.decimals()));
        (self.amount * multiplier)
            .round()
            .to_i64()
            .unwrap_or(i64::MAX)
    }

    /// Amount as a whole number of major units, rounded up.
    ///
    /// Mobile money APIs that only take integers must never undercharge,
    /// so fractional amounts round toward the customer paying more.
    pub fn major_units_ceil(&self) -> i64 {
        self.amount.ceil().to_i64().unwrap_or(i64::MAX)
    }

    /// Amount rendered as a plain decimal string for wire formats.
    pub fn major_units_string(&self) -> String {
        self.amount.normalize().to_string()
    }

    /// Check if zero.
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount.normalize(), self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn money_rejects_negative_amounts() {
        assert!(Money::new(dec!(-1), CurrencyCode::KES).is_err());
        assert!(Money::new(dec!(0), CurrencyCode::KES).is_ok());
    }

    #[test]
    fn minor_units_multiplies_by_decimal_places() {
        let money = Money::new(dec!(500), CurrencyCode::KES).unwrap();
        assert_eq!(money.minor_units(), 50000);

        let money = Money::new(dec!(29.99), CurrencyCode::NGN).unwrap();
        assert_eq!(money.minor_units(), 2999);
    }

    #[test]
    fn minor_units_passes_zero_decimal_currencies_through() {
        let money = Money::new(dec!(1500), CurrencyCode::UGX).unwrap();
        assert_eq!(money.minor_units(), 1500);
    }

    #[test]
    fn major_units_ceil_rounds_up() {
        let money = Money::new(dec!(100.01), CurrencyCode::KES).unwrap();
        assert_eq!(money.major_units_ceil(), 101);

        let money = Money::new(dec!(100.00), CurrencyCode::KES).unwrap();
        assert_eq!(money.major_units_ceil(), 100);
    }

    #[test]
    fn major_units_string_drops_trailing_zeros() {
        let money = Money::new(dec!(250.50), CurrencyCode::GHS).unwrap();
        assert_eq!(money.major_units_string(), "250.5");

        let money = Money::new(dec!(1000.00), CurrencyCode::UGX).unwrap();
        assert_eq!(money.major_units_string(), "1000");
    }

    #[test]
    fn currency_code_roundtrips_through_from_code() {
        for code in ["NGN", "GHS", "ZAR", "KES", "TZS", "UGX", "RWF", "ZMW", "MWK", "XAF", "XOF"] {
            let currency = CurrencyCode::from_code(code).unwrap();
            assert_eq!(currency.code(), code);
        }
        assert!(CurrencyCode::from_code("USD").is_none());
    }

    #[test]
    fn zero_decimal_currencies_are_flagged() {
        assert!(CurrencyCode::UGX.is_zero_decimal());
        assert!(CurrencyCode::RWF.is_zero_decimal());
        assert!(!CurrencyCode::KES.is_zero_decimal());
    }

    #[test]
    fn display_shows_amount_and_code() {
        let money = Money::new(dec!(500.00), CurrencyCode::KES).unwrap();
        assert_eq!(money.to_string(), "500 KES");
    }
}
