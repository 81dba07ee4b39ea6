//! Configuration loading from environment.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use ledger_hex::EngineConfig;
use ledger_types::Currency;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub currencies: Vec<Currency>,
    pub fee_cache_ttl: Duration,
    pub event_queue_capacity: usize,
    pub event_workers: usize,
    pub collaborator_timeout: Duration,
    pub seed_batch_size: usize,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub receipt_service_url: Option<String>,
    pub directory_service_url: Option<String>,
    pub pending_sweep_interval: Duration,
    /// OTLP collector; traces stay local when unset
    pub otlp_endpoint: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow!("DATABASE_URL environment variable is required"))?;

        let currencies = match optional("LEDGER_CURRENCIES") {
            Some(list) => parse_currencies(&list)?,
            None => EngineConfig::default().currencies,
        };

        Ok(Self {
            database_url,
            currencies,
            fee_cache_ttl: Duration::from_secs(parse_or("FEE_CACHE_TTL_SECS", 300)?),
            event_queue_capacity: parse_or("EVENT_QUEUE_CAPACITY", 1024)?,
            event_workers: parse_or("EVENT_WORKERS", 4)?,
            collaborator_timeout: Duration::from_millis(parse_or("COLLABORATOR_TIMEOUT_MS", 5000)?),
            seed_batch_size: parse_or("SEED_BATCH_SIZE", 500)?,
            webhook_url: optional("WEBHOOK_URL"),
            webhook_secret: optional("WEBHOOK_SECRET"),
            receipt_service_url: optional("RECEIPT_SERVICE_URL"),
            directory_service_url: optional("DIRECTORY_SERVICE_URL"),
            pending_sweep_interval: Duration::from_secs(parse_or("PENDING_SWEEP_SECS", 60)?),
            otlp_endpoint: optional("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            fee_cache_ttl: self.fee_cache_ttl,
            event_queue_capacity: self.event_queue_capacity,
            event_workers: self.event_workers,
            collaborator_timeout: self.collaborator_timeout,
            seed_batch_size: self.seed_batch_size,
            currencies: self.currencies.clone(),
            ..EngineConfig::default()
        }
    }
}

/// Set and non-blank.
fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match optional(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} has an invalid value {:?}: {}", name, raw, e)),
        None => Ok(default),
    }
}

fn parse_currencies(list: &str) -> anyhow::Result<Vec<Currency>> {
    let mut currencies = Vec::new();
    for code in list.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let currency: Currency = code
            .parse()
            .map_err(|e| anyhow!("LEDGER_CURRENCIES: {}", e))?;
        if !currencies.contains(&currency) {
            currencies.push(currency);
        }
    }
    if currencies.is_empty() {
        return Err(anyhow!("LEDGER_CURRENCIES must name at least one currency"));
    }
    Ok(currencies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_list() {
        assert_eq!(
            parse_currencies("kes, USD,KES").unwrap(),
            vec![Currency::KES, Currency::USD]
        );
        assert!(parse_currencies(" , ").is_err());
        assert!(parse_currencies("KES,XYZ").is_err());
    }
}
