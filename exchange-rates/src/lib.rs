//! Currency catalogue and decimal exchange rates.
//!
//! Every currency the ledger can hold is declared once in the
//! `define_currencies!` invocation at the bottom of this file. The macro
//! generates the [`CurrencyCode`] enum together with its metadata (symbol,
//! minor-unit exponent, base rate against USD).
//!
//! Rates are `rust_decimal::Decimal` throughout so that conversions of
//! minor-unit amounts never drift the way binary floating point does.
//!
//! # Adding a New Currency
//! Add a line to the `define_currencies!` invocation:
//! ```ignore
//! define_currencies! {
//!     // ... existing currencies ...
//!     JPY => ("JPY", "¥", 0, dec!(0.0067)),
//! }
//! ```
//!
//! # Example
//! ```
//! use exchange_rates::{CurrencyCode, RateTable};
//!
//! let rates = RateTable::base();
//! // 100.00 USD expressed in KES minor units
//! let kes = rates.convert_minor(10_000, CurrencyCode::USD, CurrencyCode::KES).unwrap();
//! assert!(kes > 1_000_000);
//! ```

use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Errors raised by rate lookups and conversions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateError {
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Rate not available for {0} -> {1}")]
    RateNotAvailable(CurrencyCode, CurrencyCode),

    #[error("Converted amount overflows minor units")]
    Overflow,
}

// ─────────────────────────────────────────────────────────────────────────────
// THE MACRO: Defines all currencies and their metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Macro to define currencies with auto-generated metadata accessors.
///
/// # Syntax
/// ```ignore
/// define_currencies! {
///     CurrencyName => ("CODE", "SYMBOL", minor_unit_exponent, usd_rate),
/// }
/// ```
#[macro_export]
macro_rules! define_currencies {
    (
        $(
            $name:ident => ($code:literal, $symbol:literal, $exponent:expr, $to_usd:expr)
        ),* $(,)?
    ) => {
        /// ISO-style code of a currency the ledger can hold.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "UPPERCASE")]
        pub enum CurrencyCode {
            $($name),*
        }

        impl CurrencyCode {
            pub fn code(&self) -> &'static str {
                match self {
                    $(CurrencyCode::$name => $code),*
                }
            }

            pub fn symbol(&self) -> &'static str {
                match self {
                    $(CurrencyCode::$name => $symbol),*
                }
            }

            /// Number of decimal places carried by the minor unit.
            pub fn decimal_places(&self) -> u32 {
                match self {
                    $(CurrencyCode::$name => $exponent),*
                }
            }

            /// USD value of one major unit under the built-in rate table.
            pub fn base_usd_rate(&self) -> Decimal {
                match self {
                    $(CurrencyCode::$name => $to_usd),*
                }
            }

            pub fn all() -> &'static [CurrencyCode] {
                &[$(CurrencyCode::$name),*]
            }
        }

        impl std::fmt::Display for CurrencyCode {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.code())
            }
        }

        impl std::str::FromStr for CurrencyCode {
            type Err = RateError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_uppercase().as_str() {
                    $($code => Ok(CurrencyCode::$name),)*
                    _ => Err(RateError::UnknownCurrency(s.to_string())),
                }
            }
        }
    };
}

// ─────────────────────────────────────────────────────────────────────────────
// CURRENCY DEFINITIONS - Add new currencies here!
// ─────────────────────────────────────────────────────────────────────────────

define_currencies! {
    USD => ("USD", "$", 2, dec!(1)),
    EUR => ("EUR", "€", 2, dec!(1.087)),
    GBP => ("GBP", "£", 2, dec!(1.266)),
    INR => ("INR", "₹", 2, dec!(0.01203)),
    KES => ("KES", "KSh", 2, dec!(0.0077)),
    UGX => ("UGX", "USh", 0, dec!(0.00027)),
    TZS => ("TZS", "TSh", 2, dec!(0.00039)),
    NGN => ("NGN", "₦", 2, dec!(0.00065)),
    ZAR => ("ZAR", "R", 2, dec!(0.054)),
    USDT => ("USDT", "₮", 6, dec!(1)),
    BTC => ("BTC", "₿", 8, dec!(60000)),
}

impl CurrencyCode {
    /// Number of minor units in one major unit (100 for cents).
    pub fn minor_per_major(&self) -> Decimal {
        Decimal::from(10i64.pow(self.decimal_places()))
    }

    /// Expresses a minor-unit amount in major units without rounding.
    pub fn to_major(&self, minor: i64) -> Decimal {
        Decimal::from(minor) / self.minor_per_major()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rate table
// ─────────────────────────────────────────────────────────────────────────────

/// Exchange rates keyed by each currency's USD value.
///
/// Cross rates are derived through USD; a table is an explicit value passed
/// to whoever needs it, never process-wide state.
#[derive(Debug, Clone)]
pub struct RateTable {
    usd_rates: HashMap<CurrencyCode, Decimal>,
}

impl RateTable {
    /// Table seeded with the built-in base rates.
    pub fn base() -> Self {
        let usd_rates = CurrencyCode::all()
            .iter()
            .map(|c| (*c, c.base_usd_rate()))
            .collect();
        Self { usd_rates }
    }

    /// Overrides the USD value of one major unit of `currency`.
    pub fn with_rate(mut self, currency: CurrencyCode, usd_rate: Decimal) -> Self {
        self.usd_rates.insert(currency, usd_rate);
        self
    }

    fn usd_rate(&self, currency: CurrencyCode, other: CurrencyCode) -> Result<Decimal, RateError> {
        match self.usd_rates.get(&currency) {
            Some(rate) if !rate.is_zero() => Ok(*rate),
            _ => Err(RateError::RateNotAvailable(currency, other)),
        }
    }

    /// How many major units of `to` one major unit of `from` buys.
    pub fn rate(&self, from: CurrencyCode, to: CurrencyCode) -> Result<Decimal, RateError> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        let from_usd = self.usd_rate(from, to)?;
        let to_usd = self.usd_rate(to, from)?;
        Ok(from_usd / to_usd)
    }

    /// Converts a minor-unit amount, rounding once to the target minor unit.
    pub fn convert_minor(
        &self,
        amount: i64,
        from: CurrencyCode,
        to: CurrencyCode,
    ) -> Result<i64, RateError> {
        if from == to {
            return Ok(amount);
        }
        let rate = self.rate(from, to)?;
        let target = from.to_major(amount) * rate * to.minor_per_major();
        target
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(RateError::Overflow)
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::base()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
