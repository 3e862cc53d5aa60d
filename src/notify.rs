//! Customer notification links.
//!
//! Messages leave the till through the cashier's own mail, SMS or WhatsApp
//! client, so the core only ever builds URLs. A [`Dispatcher`] decides what
//! happens to them.

use async_trait::async_trait;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel { Email, Sms, Whatsapp }

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Email => "email", Self::Sms => "sms", Self::Whatsapp => "whatsapp" }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub channel: Channel,
    pub url: String,
}

pub fn email_link(to: &str, subject: &str, body: &str) -> OutboundMessage {
    let url = format!(
        "mailto:{}?subject={}&body={}",
        urlencoding::encode(to.trim()),
        urlencoding::encode(subject),
        urlencoding::encode(body)
    );
    OutboundMessage { channel: Channel::Email, url }
}

pub fn sms_link(phone: &str, body: &str) -> OutboundMessage {
    let url = format!("sms:{}?body={}", urlencoding::encode(&dial_string(phone)), urlencoding::encode(body));
    OutboundMessage { channel: Channel::Sms, url }
}

/// `wa.me` wants the full international number as bare digits.
pub fn whatsapp_link(phone: &str, country_code: &str, body: &str) -> OutboundMessage {
    let url = format!("https://wa.me/{}?text={}", international_digits(phone, country_code), urlencoding::encode(body));
    OutboundMessage { channel: Channel::Whatsapp, url }
}

/// Keeps a leading `+` and digits only.
fn dial_string(phone: &str) -> String {
    let trimmed = phone.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if trimmed.starts_with('+') { format!("+{digits}") } else { digits }
}

fn international_digits(phone: &str, country_code: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    let digits = digits.trim_start_matches('0');
    if digits.len() == 10 { format!("{country_code}{digits}") } else { digits.to_string() }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{channel} dispatch failed: {reason}")]
    Failed { channel: &'static str, reason: String },
}

#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    async fn dispatch(&self, message: &OutboundMessage) -> Result<(), DispatchError>;
}

/// Logs the link and leaves opening it to the client that receives the
/// checkout response.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinkLogger;

#[async_trait]
impl Dispatcher for LinkLogger {
    async fn dispatch(&self, message: &OutboundMessage) -> Result<(), DispatchError> {
        tracing::info!(channel = message.channel.as_str(), url = %message.url, "notification link ready");
        Ok(())
    }
}
