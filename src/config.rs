//! Process configuration from the environment.

use std::str::FromStr;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use crate::checkout::CheckoutSettings;
use crate::domain::value_objects::TaxRate;
use crate::receipt::ReceiptSettings;

#[derive(Clone, Debug)]
pub struct PosConfig {
    /// Unset means the in-memory store.
    pub database_url: Option<String>,
    pub port: u16,
    pub store_name: String,
    pub currency: String,
    pub tax_rate: TaxRate,
    pub phone_country_code: String,
    pub receipt_footer: Option<String>,
}

impl PosConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = get("PORT").unwrap_or_else(|| "8083".to_string());
        let port = u16::from_str(port.trim()).with_context(|| format!("PORT is not a valid port: {port}"))?;
        let tax = get("TAX_RATE").unwrap_or_else(|| "18".to_string());
        let tax = Decimal::from_str(tax.trim()).with_context(|| format!("TAX_RATE is not a number: {tax}"))?;
        let tax_rate = TaxRate::new(tax).context("TAX_RATE out of range")?;

        Ok(Self {
            database_url: get("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            port,
            store_name: get("STORE_NAME").unwrap_or_else(|| "OpenSASE POS".to_string()),
            currency: get("CURRENCY").unwrap_or_else(|| "INR".to_string()),
            tax_rate,
            phone_country_code: get("PHONE_COUNTRY_CODE").unwrap_or_else(|| "91".to_string()),
            receipt_footer: get("RECEIPT_FOOTER").or_else(|| Some("Thank you for shopping with us!".to_string())),
        })
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            global_tax_rate: self.tax_rate,
            phone_country_code: self.phone_country_code.clone(),
            receipt: ReceiptSettings {
                store_name: self.store_name.clone(),
                currency: self.currency.clone(),
                footer: self.receipt_footer.clone(),
            },
        }
    }
}
