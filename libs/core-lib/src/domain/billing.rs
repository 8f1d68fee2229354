use crate::Command;
use crate::domain::tenant::{StatusTrigger, SubscriptionRecord};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Resource family named by the `type` field of a provider notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Payment,
    Preapproval,
}

impl NotificationKind {
    /// `None` for notification types this service does not consume.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "payment" => Some(NotificationKind::Payment),
            "subscription_preapproval" | "preapproval" => Some(NotificationKind::Preapproval),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Payment => "payment",
            NotificationKind::Preapproval => "subscription_preapproval",
        }
    }
}

/// Authoritative state of a payment or preapproval, as fetched back from
/// the provider after a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEvent {
    pub kind: NotificationKind,
    pub resource_id: String,
    pub status: String,
    pub external_reference: Option<String>,
    pub payer_id: Option<String>,
    pub amount: Option<Decimal>,
}

impl ProviderEvent {
    pub fn trigger(&self) -> Option<StatusTrigger> {
        match (self.kind, self.status.as_str()) {
            (NotificationKind::Payment, "approved") => Some(StatusTrigger::PaymentApproved),
            (NotificationKind::Preapproval, "authorized" | "active") => {
                Some(StatusTrigger::PaymentApproved)
            }
            (NotificationKind::Preapproval, "cancelled" | "paused") => {
                Some(StatusTrigger::PaymentLapsed)
            }
            _ => None,
        }
    }

    /// The tenant named by `external_reference`, if it is a well-formed id.
    pub fn tenant_id(&self) -> Option<Uuid> {
        self.external_reference
            .as_deref()
            .and_then(|r| Uuid::parse_str(r.trim()).ok())
    }

    /// Stable key for one (resource, status) pair. A redelivery of the same
    /// notification maps to the same key.
    pub fn idempotency_key(&self, provider: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            provider,
            self.kind.as_str(),
            self.resource_id,
            self.status
        )
    }

    /// Audit row for an approved one-off payment.
    pub fn audit_record(&self, tenant_id: Uuid, now: DateTime<Utc>) -> Option<SubscriptionRecord> {
        match (self.kind, self.status.as_str()) {
            (NotificationKind::Payment, "approved") => Some(SubscriptionRecord::approved_payment(
                tenant_id,
                &self.resource_id,
                self.amount.unwrap_or(Decimal::ZERO),
                now,
            )),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookOutcome {
    Applied,
    Duplicate,
    Ignored,
    Unresolved,
}

// --- Checkout ---

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub tenant_id: Uuid,
    pub title: String,
    pub description: String,
    pub unit_price: Decimal,
    pub payer_email: String,
    pub payer_name: Option<String>,
    pub success_url: String,
    pub failure_url: String,
    pub pending_url: String,
    pub notification_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub checkout_url: String,
    pub sandbox_url: Option<String>,
    pub preference_id: String,
}

// --- Webhook signatures ---

/// The string the provider signs: `id:<data.id>;request-id:<x-request-id>;ts:<ts>;`.
/// Parts without a value are left out. Alphanumeric ids are lowercased.
pub fn signature_manifest(data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
    let mut manifest = String::new();
    if let Some(id) = data_id.filter(|id| !id.is_empty()) {
        if id.chars().all(|c| c.is_ascii_alphanumeric()) {
            manifest.push_str(&format!("id:{};", id.to_ascii_lowercase()));
        } else {
            manifest.push_str(&format!("id:{};", id));
        }
    }
    if let Some(request_id) = request_id.filter(|r| !r.is_empty()) {
        manifest.push_str(&format!("request-id:{};", request_id));
    }
    manifest.push_str(&format!("ts:{};", ts));
    manifest
}

/// Checks an `x-signature: ts=<ts>,v1=<hex hmac>` header. `data_id` is the
/// `data.id` query parameter of the notification URL.
pub fn verify_signature(
    secret: &str,
    signature_header: &str,
    request_id: Option<&str>,
    data_id: Option<&str>,
) -> bool {
    let mut ts = None;
    let mut v1 = None;
    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value.trim()),
            Some(("v1", value)) => v1 = Some(value.trim()),
            _ => {}
        }
    }
    let (Some(ts), Some(v1)) = (ts, v1) else {
        return false;
    };
    let Ok(expected) = hex::decode(v1) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signature_manifest(data_id, request_id, ts).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Produces the header value a provider would send. Used by tests and local
/// replay tooling.
pub fn sign_notification(
    secret: &str,
    ts: &str,
    request_id: Option<&str>,
    data_id: Option<&str>,
) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(signature_manifest(data_id, request_id, ts).as_bytes());
    Some(format!("ts={},v1={}", ts, hex::encode(mac.finalize().into_bytes())))
}

/// Provider resource ids are numeric or short alphanumeric tokens. Anything
/// else must not reach the provider's URL paths.
pub fn is_valid_resource_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

// --- Commands ---

/// A provider notification as received: only the type and resource id are
/// trusted, everything else is fetched back from the provider.
#[derive(Debug, Clone)]
pub struct ProcessNotification {
    pub kind: String,
    pub resource_id: String,
}

#[derive(Debug, Clone)]
pub struct CreateCheckout {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
}

impl Command for ProcessNotification {}
impl Command for CreateCheckout {}
