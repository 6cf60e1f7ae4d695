use crate::error::{MarketError, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use uuid::Uuid;
use validator::{Validate, ValidationError};

pub type UserId = Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Host,
    #[default]
    Guest,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Host => "host",
            Role::Guest => "guest",
        };
        f.write_str(name)
    }
}

/// A registered marketplace user.
///
/// The role is fixed at creation. `password_hash` holds an argon2 PHC string
/// and is only ever exposed to storage; clients see [`UserView`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct User {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub role: Role,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Signup payload.
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct NewUser {
    #[validate(
        length(min = 1, max = 150, message = "must be between 1 and 150 characters"),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[validate(email(message = "enter a valid email address"))]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
}

/// Public projection of a [`User`].
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct UserView {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub phone_number: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Validates a signup payload and hashes its password.
    ///
    /// Admin accounts cannot be self-registered; they come from the seeding
    /// utility via [`User::with_role`].
    pub fn register(new: NewUser) -> Result<Self> {
        if new.role == Role::Admin {
            return Err(MarketError::ValidationError(
                "role: admin accounts cannot be created through signup".to_string(),
            ));
        }
        Self::with_role(new)
    }

    pub fn with_role(mut new: NewUser) -> Result<Self> {
        new.username = new.username.trim().to_string();
        new.email = new.email.trim().to_lowercase();
        new.validate()?;

        Ok(Self {
            user_id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            first_name: new.first_name.trim().to_string(),
            last_name: new.last_name.trim().to_string(),
            phone_number: new.phone_number.filter(|p| !p.trim().is_empty()),
            role: new.role,
            password_hash: hash_password(&new.password)?,
            created_at: Utc::now(),
        })
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn verify_password(&self, password: &str) -> bool {
        PasswordHash::new(&self.password_hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn view(&self) -> UserView {
        UserView {
            user_id: self.user_id,
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            full_name: self.full_name(),
            phone_number: self.phone_number.clone(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| MarketError::internal(format!("password hashing failed: {e}")))
}

fn validate_username(username: &str) -> std::result::Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Ok(());
    }
    let mut error = ValidationError::new("username");
    error.message = Some(Cow::from("may only contain letters, digits and @/./+/-/_"));
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(username: &str, role: Role) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            phone_number: None,
            role,
            password: "correct-horse".to_string(),
        }
    }

    #[test]
    fn test_register_hashes_password() {
        let user = User::register(signup("ada", Role::Host)).unwrap();
        assert_ne!(user.password_hash, "correct-horse");
        assert!(user.password_hash.starts_with("$argon2"));
        assert!(user.verify_password("correct-horse"));
        assert!(!user.verify_password("wrong-horse"));
        assert_eq!(user.full_name(), "Ada Lovelace");
    }

    #[test]
    fn test_register_rejects_admin_role() {
        let result = User::register(signup("root", Role::Admin));
        assert!(matches!(result, Err(MarketError::ValidationError(_))));
        assert!(User::with_role(signup("root", Role::Admin)).is_ok());
    }

    #[test]
    fn test_register_validates_fields() {
        let mut bad_email = signup("bob", Role::Guest);
        bad_email.email = "bob.example.com".to_string();
        assert!(User::register(bad_email).is_err());

        let mut short_password = signup("bob", Role::Guest);
        short_password.password = "short".to_string();
        assert!(User::register(short_password).is_err());

        assert!(User::register(signup("  ", Role::Guest)).is_err());
        assert!(User::register(signup("bob smith", Role::Guest)).is_err());
    }

    #[test]
    fn test_register_rejects_malformed_email() {
        let mut doubled_at = signup("bob", Role::Guest);
        doubled_at.email = "a@@b.c".to_string();
        assert!(matches!(
            User::register(doubled_at),
            Err(MarketError::ValidationError(msg)) if msg == "email: enter a valid email address"
        ));
    }

    #[test]
    fn test_register_normalizes_before_validating() {
        let mut padded = signup("dave", Role::Guest);
        padded.username = "  dave ".to_string();
        padded.email = " Dave@Example.COM ".to_string();
        let user = User::register(padded).unwrap();
        assert_eq!(user.username, "dave");
        assert_eq!(user.email, "dave@example.com");
    }

    #[test]
    fn test_validation_errors_name_every_failing_field() {
        let mut bad = signup("bob smith", Role::Guest);
        bad.password = "short".to_string();
        let Err(MarketError::ValidationError(msg)) = User::register(bad) else {
            panic!("expected a validation error");
        };
        assert_eq!(
            msg,
            "password: must be at least 8 characters; \
             username: may only contain letters, digits and @/./+/-/_"
        );
    }

    #[test]
    fn test_view_hides_credentials() {
        let user = User::register(signup("carol", Role::Guest)).unwrap();
        let json = serde_json::to_value(user.view()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "guest");
        assert_eq!(json["full_name"], "Ada Lovelace");
    }
}
