//! Customer Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub customer_type: CustomerType,
    pub credit_limit: Decimal,
    pub outstanding_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerType { #[default] Retail, Wholesale }

impl CustomerType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Retail => "retail", Self::Wholesale => "wholesale" }
    }
    pub fn parse(value: &str) -> Option<Self> {
        match value { "retail" => Some(Self::Retail), "wholesale" => Some(Self::Wholesale), _ => None }
    }
}

impl Customer {
    pub fn create(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(), name: name.into(), email: None, phone: None,
            customer_type: CustomerType::Retail, credit_limit: Decimal::ZERO,
            outstanding_balance: Decimal::ZERO, created_at: Utc::now(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self { self.email = Some(email.into()); self }
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self { self.phone = Some(phone.into()); self }

    /// Email, ignoring blank values left behind by form edits.
    pub fn contact_email(&self) -> Option<&str> { non_blank(self.email.as_deref()) }
    pub fn contact_phone(&self) -> Option<&str> { non_blank(self.phone.as_deref()) }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
