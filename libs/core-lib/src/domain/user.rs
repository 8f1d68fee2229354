use crate::{Command, CoreError};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 8;

// --- Role ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    ClinicAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::ClinicAdmin => "CLINIC_ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            "CLINIC_ADMIN" => Ok(Role::ClinicAdmin),
            other => Err(UserError::UnknownRole(other.to_string())),
        }
    }
}

// --- User ---

/// A login identity. Clinic admins always belong to a tenant; super admins
/// never do.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    id: Uuid,
    name: Option<String>,
    email: String,
    password_hash: String,
    role: Role,
    tenant_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl User {
    pub fn clinic_admin(
        name: &str,
        email: &str,
        password_hash: String,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Self, UserError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(UserError::InvalidInput("Name cannot be empty".into()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name: Some(name.to_string()),
            email: normalize_email(email)?,
            password_hash,
            role: Role::ClinicAdmin,
            tenant_id: Some(tenant_id),
            created_at: now,
        })
    }

    pub fn super_admin(
        email: &str,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<Self, UserError> {
        Ok(Self {
            id: Uuid::new_v4(),
            name: None,
            email: normalize_email(email)?,
            password_hash,
            role: Role::SuperAdmin,
            tenant_id: None,
            created_at: now,
        })
    }

    /// Rebuild a stored user, re-checking the role/tenant pairing.
    pub(crate) fn restore(
        id: Uuid,
        name: Option<String>,
        email: String,
        password_hash: String,
        role: Role,
        tenant_id: Option<Uuid>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, UserError> {
        match (role, tenant_id) {
            (Role::SuperAdmin, None) | (Role::ClinicAdmin, Some(_)) => Ok(Self {
                id,
                name,
                email,
                password_hash,
                role,
                tenant_id,
                created_at,
            }),
            (role, _) => Err(UserError::InvalidInput(format!(
                "User {} has role {} with mismatched tenant",
                id, role
            ))),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        self.tenant_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }
}

// --- Credentials ---

/// Trimmed, lowercased email. Rejects anything without a local part and a
/// dotted domain.
pub fn normalize_email(email: &str) -> Result<String, UserError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(UserError::InvalidInput("Invalid email address".into()))
    }
}

pub fn validate_password(password: &str) -> Result<(), UserError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(UserError::InvalidInput(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String, UserError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| UserError::Hashing(e.to_string()))
}

/// `Err(InvalidPassword)` for a wrong password, `Err(Hashing)` for a
/// corrupt stored hash.
pub fn verify_password(password: &str, password_hash: &str) -> Result<(), UserError> {
    let parsed = PasswordHash::new(password_hash).map_err(|e| UserError::Hashing(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| UserError::InvalidPassword)
}

// --- Commands ---

#[derive(Debug, Clone)]
pub struct LoginUser {
    pub email: String,
    pub password: String,
}

/// Create the platform super admin if no user holds that email yet.
#[derive(Debug, Clone)]
pub struct BootstrapSuperAdmin {
    pub email: String,
    pub password: String,
}

impl Command for LoginUser {}
impl Command for BootstrapSuperAdmin {}

// --- Errors ---

#[derive(thiserror::Error, Debug)]
pub enum UserError {
    #[error("Core Error: {0}")]
    Core(#[from] CoreError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unknown role: {0}")]
    UnknownRole(String),
    #[error("Invalid password")] // Keep generic for security
    InvalidPassword,
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}
