//! Exchange rate provider port.
//!
//! Implementations can be static tables, HTTP clients, mock providers, etc.

use rust_decimal::Decimal;

use crate::domain::Currency;

/// Error type for exchange rate operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Rate not available for {0} -> {1}")]
    RateNotAvailable(Currency, Currency),

    #[error("Converted amount overflows minor units")]
    Overflow,
}

impl From<exchange_rates::RateError> for ExchangeError {
    fn from(err: exchange_rates::RateError) -> Self {
        match err {
            exchange_rates::RateError::UnknownCurrency(c) => ExchangeError::UnsupportedCurrency(c),
            exchange_rates::RateError::RateNotAvailable(from, to) => {
                ExchangeError::RateNotAvailable(from, to)
            }
            exchange_rates::RateError::Overflow => ExchangeError::Overflow,
        }
    }
}

/// Port trait for exchange rate providers.
#[async_trait::async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    /// How many major units of `to` one major unit of `from` buys.
    async fn get_rate(&self, from: Currency, to: Currency) -> Result<Decimal, ExchangeError>;

    /// Converts a minor-unit amount, rounding once to the target minor unit.
    async fn convert(&self, amount: i64, from: Currency, to: Currency) -> Result<i64, ExchangeError>;
}
