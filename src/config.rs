use crate::error::{FulfillmentError, Result};
use std::str::FromStr;

/// Engine configuration.
///
/// Built once at startup and handed to every service; nothing reads the
/// environment after construction.
///
/// | Variable | Default |
/// |----------|---------|
/// | FULFILLMENT_CURRENCIES | USD,EUR |
/// | FULFILLMENT_ORDER_PREFIX | ORD |
/// | FULFILLMENT_REMITTANCE_PREFIX | REM |
/// | FULFILLMENT_NUMBER_ATTEMPTS | 5 |
/// | FULFILLMENT_CAS_RETRIES | 3 |
/// | FULFILLMENT_ALERT_HOURS | 48 |
/// | FULFILLMENT_ASSIGN_ORDER_ACCOUNTS | true |
/// | FULFILLMENT_REGISTER_REMITTANCE_ACCOUNTS | true |
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Currency codes accepted at checkout and remittance creation.
    pub supported_currencies: Vec<String>,
    pub order_number_prefix: String,
    pub remittance_number_prefix: String,
    /// How many times a colliding order/remittance number is regenerated.
    pub number_attempts: u32,
    /// Compare-and-set retries for inventory rows and account counters.
    pub cas_retries: u32,
    /// A remittance in processing for longer than this raises an alert.
    pub processing_alert_hours: i64,
    /// Register a product-class payment account at checkout.
    pub assign_order_accounts: bool,
    /// Pre-register a remittance-class payment account at creation.
    pub register_remittance_accounts: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            supported_currencies: vec!["USD".to_string(), "EUR".to_string()],
            order_number_prefix: "ORD".to_string(),
            remittance_number_prefix: "REM".to_string(),
            number_attempts: 5,
            cas_retries: 3,
            processing_alert_hours: 48,
            assign_order_accounts: true,
            register_remittance_accounts: true,
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from `FULFILLMENT_*` variables, falling back
    /// to the defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let supported_currencies = match lookup("FULFILLMENT_CURRENCIES") {
            Some(raw) => raw
                .split(',')
                .map(|code| code.trim().to_ascii_uppercase())
                .filter(|code| !code.is_empty())
                .collect(),
            None => defaults.supported_currencies,
        };
        if supported_currencies.is_empty() {
            return Err(FulfillmentError::validation(
                "FULFILLMENT_CURRENCIES must list at least one currency",
            ));
        }

        let config = Self {
            supported_currencies,
            order_number_prefix: lookup("FULFILLMENT_ORDER_PREFIX")
                .unwrap_or(defaults.order_number_prefix),
            remittance_number_prefix: lookup("FULFILLMENT_REMITTANCE_PREFIX")
                .unwrap_or(defaults.remittance_number_prefix),
            number_attempts: parse_var(&lookup, "FULFILLMENT_NUMBER_ATTEMPTS", defaults.number_attempts)?,
            cas_retries: parse_var(&lookup, "FULFILLMENT_CAS_RETRIES", defaults.cas_retries)?,
            processing_alert_hours: parse_var(
                &lookup,
                "FULFILLMENT_ALERT_HOURS",
                defaults.processing_alert_hours,
            )?,
            assign_order_accounts: parse_var(
                &lookup,
                "FULFILLMENT_ASSIGN_ORDER_ACCOUNTS",
                defaults.assign_order_accounts,
            )?,
            register_remittance_accounts: parse_var(
                &lookup,
                "FULFILLMENT_REGISTER_REMITTANCE_ACCOUNTS",
                defaults.register_remittance_accounts,
            )?,
        };

        if config.number_attempts == 0 {
            return Err(FulfillmentError::validation(
                "FULFILLMENT_NUMBER_ATTEMPTS must be at least 1",
            ));
        }
        Ok(config)
    }

    pub fn supports_currency(&self, code: &str) -> bool {
        self.supported_currencies.iter().any(|c| c == code)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| FulfillmentError::validation(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}
