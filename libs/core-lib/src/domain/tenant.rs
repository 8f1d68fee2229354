use crate::{Command, CoreError};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};
use uuid::Uuid;

/// Used when a clinic name has no ASCII letters or digits left after folding.
pub const FALLBACK_SLUG: &str = "clinica";

// --- Subscription status ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    /// Awaiting platform admin approval.
    Pending,
    /// Time-boxed free access until `trial_ends_at`.
    Trial,
    /// Paid.
    Active,
    /// Rejected, cancelled or lapsed.
    Suspended,
}

/// Something that moves a tenant between subscription states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTrigger {
    AdminApproved,
    AdminRejected,
    PaymentApproved,
    PaymentLapsed,
    TrialExpired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "PENDING",
            SubscriptionStatus::Trial => "TRIAL",
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Suspended => "SUSPENDED",
        }
    }

    /// State reached after `trigger`. Every trigger is accepted in every
    /// state and re-applying a trigger yields the same state.
    pub fn on(self, trigger: StatusTrigger) -> SubscriptionStatus {
        match (self, trigger) {
            (_, StatusTrigger::AdminApproved | StatusTrigger::PaymentApproved) => {
                SubscriptionStatus::Active
            }
            (_, StatusTrigger::AdminRejected | StatusTrigger::PaymentLapsed) => {
                SubscriptionStatus::Suspended
            }
            (SubscriptionStatus::Trial, StatusTrigger::TrialExpired) => {
                SubscriptionStatus::Suspended
            }
            (current, StatusTrigger::TrialExpired) => current,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SubscriptionStatus::Pending),
            "TRIAL" => Ok(SubscriptionStatus::Trial),
            "ACTIVE" => Ok(SubscriptionStatus::Active),
            "SUSPENDED" => Ok(SubscriptionStatus::Suspended),
            other => Err(TenantError::UnknownStatus(other.to_string())),
        }
    }
}

/// Outcome of the subscription gate for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    PaymentRequired,
}

// --- Tenant ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub subscription_status: SubscriptionStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub payment_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// A tenant as created by clinic signup: TRIAL when `trial_days > 0`,
    /// otherwise PENDING. Never ACTIVE.
    pub fn signup(
        name: &str,
        slug: String,
        trial_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, TenantError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TenantError::InvalidInput(
                "Clinic name cannot be empty".into(),
            ));
        }
        if slug.is_empty() {
            return Err(TenantError::InvalidInput("Slug cannot be empty".into()));
        }

        let (subscription_status, trial_ends_at) = if trial_days > 0 {
            (
                SubscriptionStatus::Trial,
                Some(now + Duration::days(i64::from(trial_days))),
            )
        } else {
            (SubscriptionStatus::Pending, None)
        };

        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug,
            subscription_status,
            trial_ends_at,
            payment_customer_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// ACTIVE, or TRIAL with an end date still in the future.
    pub fn access_at(&self, now: DateTime<Utc>) -> Access {
        match self.subscription_status {
            SubscriptionStatus::Active => Access::Granted,
            SubscriptionStatus::Trial => match self.trial_ends_at {
                Some(ends_at) if ends_at > now => Access::Granted,
                _ => Access::PaymentRequired,
            },
            SubscriptionStatus::Pending | SubscriptionStatus::Suspended => {
                Access::PaymentRequired
            }
        }
    }

    /// Whole days left in the trial, rounded up, never negative.
    pub fn trial_days_left(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.subscription_status != SubscriptionStatus::Trial {
            return None;
        }
        let ends_at = self.trial_ends_at?;
        let millis = (ends_at - now).num_milliseconds().max(0);
        let day = Duration::days(1).num_milliseconds();
        Some((millis + day - 1) / day)
    }
}

/// Admin console row: a tenant with its first user and product count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantOverview {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
    pub product_count: i64,
}

/// Append-only billing audit entry written on approved payments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub external_payment_id: String,
    pub amount: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    pub fn approved_payment(
        tenant_id: Uuid,
        external_payment_id: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            external_payment_id: external_payment_id.to_string(),
            amount,
            status: SubscriptionStatus::Active.as_str().to_string(),
            created_at: now,
        }
    }
}

// --- Slugs ---

/// Lowercase, accent-free, hyphen-separated slug for a clinic name.
/// `"Clínica São José"` becomes `"clinica-sao-jose"`.
pub fn generate_slug(name: &str) -> String {
    let folded: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    let mut slug = String::with_capacity(folded.len());
    let mut pending_separator = false;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c);
        } else {
            pending_separator = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Candidate number `attempt` (1-based) for a slug: the base itself first,
/// then `base-2`, `base-3`, ...
pub fn slug_candidate(base: &str, attempt: u32) -> String {
    if attempt <= 1 {
        base.to_string()
    } else {
        format!("{}-{}", base, attempt)
    }
}

/// `base` plus an 8 character base36 suffix drawn from a fresh v4 uuid.
/// Used once the numbered candidates are all taken.
pub fn random_slug_candidate(base: &str) -> String {
    const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut n = Uuid::new_v4().as_u128();
    let mut suffix = String::with_capacity(8);
    for _ in 0..8 {
        suffix.push(ALPHABET[(n % 36) as usize] as char);
        n /= 36;
    }
    format!("{}-{}", base, suffix)
}

// --- Commands ---

/// Self-service signup of a clinic and its first admin user.
#[derive(Debug, Clone)]
pub struct RegisterClinic {
    pub owner_name: String,
    pub clinic_name: String,
    pub email: String,
    pub password: String,
}

/// Platform admin approval or rejection.
#[derive(Debug, Clone)]
pub struct ChangeTenantStatus {
    pub tenant_id: Uuid,
    pub trigger: StatusTrigger,
}

impl Command for RegisterClinic {}
impl Command for ChangeTenantStatus {}

// --- Errors ---

#[derive(thiserror::Error, Debug)]
pub enum TenantError {
    #[error("Core Error: {0}")]
    Core(#[from] CoreError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unknown subscription status: {0}")]
    UnknownStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant_with(status: SubscriptionStatus, trial_ends_at: Option<DateTime<Utc>>) -> Tenant {
        let now = Utc::now();
        Tenant {
            id: Uuid::new_v4(),
            name: "Clínica Bella".to_string(),
            slug: "clinica-bella".to_string(),
            subscription_status: status,
            trial_ends_at,
            payment_customer_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_slug_strips_accents_and_joins_words() {
        assert_eq!(generate_slug("Clínica São José"), "clinica-sao-jose");
        assert_eq!(generate_slug("  Estética & Cia. Ltda  "), "estetica-cia-ltda");
        assert_eq!(generate_slug("Espaço Çedilha 2"), "espaco-cedilha-2");
    }

    #[test]
    fn test_slug_falls_back_when_nothing_is_left() {
        assert_eq!(generate_slug("!!! ***"), FALLBACK_SLUG);
        assert_eq!(generate_slug(""), FALLBACK_SLUG);
    }

    #[test]
    fn test_slug_candidates_are_suffixed_after_first() {
        assert_eq!(slug_candidate("clinica-sao-jose", 1), "clinica-sao-jose");
        assert_eq!(slug_candidate("clinica-sao-jose", 2), "clinica-sao-jose-2");
        assert_eq!(slug_candidate("clinica-sao-jose", 7), "clinica-sao-jose-7");
    }

    #[test]
    fn test_random_slug_candidate_shape() {
        let slug = random_slug_candidate("clinica-bella");
        let suffix = slug.strip_prefix("clinica-bella-").unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(random_slug_candidate("clinica-bella"), random_slug_candidate("clinica-bella"));
    }

    #[test]
    fn test_signup_is_pending_without_trial() {
        let now = Utc::now();
        let tenant = Tenant::signup("Clínica Bella", "clinica-bella".into(), 0, now).unwrap();
        assert_eq!(tenant.subscription_status, SubscriptionStatus::Pending);
        assert_eq!(tenant.trial_ends_at, None);
    }

    #[test]
    fn test_signup_with_trial_sets_end_date() {
        let now = Utc::now();
        let tenant = Tenant::signup("Clínica Bella", "clinica-bella".into(), 14, now).unwrap();
        assert_eq!(tenant.subscription_status, SubscriptionStatus::Trial);
        assert_eq!(tenant.trial_ends_at, Some(now + Duration::days(14)));
        assert_ne!(tenant.subscription_status, SubscriptionStatus::Active);
    }

    #[test]
    fn test_signup_rejects_blank_name() {
        let result = Tenant::signup("   ", "x".into(), 0, Utc::now());
        match result {
            Err(TenantError::InvalidInput(msg)) => assert!(msg.contains("name")),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_transitions() {
        use StatusTrigger::*;
        use SubscriptionStatus::*;

        assert_eq!(Pending.on(AdminApproved), Active);
        assert_eq!(Pending.on(AdminRejected), Suspended);
        assert_eq!(Trial.on(PaymentApproved), Active);
        assert_eq!(Active.on(PaymentLapsed), Suspended);
        assert_eq!(Trial.on(PaymentLapsed), Suspended);
        assert_eq!(Trial.on(TrialExpired), Suspended);
        assert_eq!(Suspended.on(AdminApproved), Active);
        assert_eq!(Suspended.on(PaymentApproved), Active);
    }

    #[test]
    fn test_trial_expiry_only_affects_trials() {
        use SubscriptionStatus::*;
        for status in [Pending, Active, Suspended] {
            assert_eq!(status.on(StatusTrigger::TrialExpired), status);
        }
    }

    #[test]
    fn test_reapplying_a_trigger_is_a_no_op() {
        let once = SubscriptionStatus::Trial.on(StatusTrigger::PaymentApproved);
        let twice = once.on(StatusTrigger::PaymentApproved);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            SubscriptionStatus::Pending,
            SubscriptionStatus::Trial,
            SubscriptionStatus::Active,
            SubscriptionStatus::Suspended,
        ] {
            assert_eq!(status.as_str().parse::<SubscriptionStatus>().unwrap(), status);
        }
        assert!("CANCELLED".parse::<SubscriptionStatus>().is_err());
    }

    #[test]
    fn test_access_decisions() {
        let now = Utc::now();

        let active = tenant_with(SubscriptionStatus::Active, None);
        assert_eq!(active.access_at(now), Access::Granted);

        let live_trial = tenant_with(SubscriptionStatus::Trial, Some(now + Duration::days(3)));
        assert_eq!(live_trial.access_at(now), Access::Granted);

        let expired_trial = tenant_with(SubscriptionStatus::Trial, Some(now - Duration::hours(1)));
        assert_eq!(expired_trial.access_at(now), Access::PaymentRequired);

        let open_trial = tenant_with(SubscriptionStatus::Trial, None);
        assert_eq!(open_trial.access_at(now), Access::PaymentRequired);

        let pending = tenant_with(SubscriptionStatus::Pending, None);
        assert_eq!(pending.access_at(now), Access::PaymentRequired);

        let suspended = tenant_with(SubscriptionStatus::Suspended, None);
        assert_eq!(suspended.access_at(now), Access::PaymentRequired);
    }

    #[test]
    fn test_trial_days_left_rounds_up() {
        let now = Utc::now();
        let tenant = tenant_with(
            SubscriptionStatus::Trial,
            Some(now + Duration::days(2) + Duration::hours(1)),
        );
        assert_eq!(tenant.trial_days_left(now), Some(3));

        let over = tenant_with(SubscriptionStatus::Trial, Some(now - Duration::days(2)));
        assert_eq!(over.trial_days_left(now), Some(0));

        let active = tenant_with(SubscriptionStatus::Active, None);
        assert_eq!(active.trial_days_left(now), None);
    }
}
