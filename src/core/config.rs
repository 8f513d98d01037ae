//! Purpose: Hold the construction-time identity for the remote account.
//! Exports: `Credentials`.
//! Role: Immutable after construction; read by the request builder only.
//! Invariants: All three identity strings are non-empty once construction succeeds.

use std::env;
use std::fmt;

use crate::core::error::{Error, ErrorKind};

pub const ENV_ACCOUNT_EMAIL: &str = "CF_EMAIL";
pub const ENV_ACCOUNT_ID: &str = "CF_ACCOUNT_ID";
pub const ENV_API_KEY: &str = "CF_GLOBAL_API_KEY";

#[derive(Clone)]
pub struct Credentials {
    account_email: String,
    account_id: String,
    api_key: String,
}

impl fmt::Debug for Credentials {
    /// Redacts the identity strings so the secret token never reaches a log sink.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_email", &"<redacted>")
            .field("account_id", &"<redacted>")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Missing identity is a construction error, never a deferred runtime one.
    pub fn new(
        account_email: impl Into<String>,
        account_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, Error> {
        let credentials = Self {
            account_email: account_email.into(),
            account_id: account_id.into(),
            api_key: api_key.into(),
        };
        if credentials.account_email.is_empty()
            || credentials.account_id.is_empty()
            || credentials.api_key.is_empty()
        {
            return Err(Error::new(ErrorKind::Config)
                .with_message("account email, account id, and api key must all be provided"));
        }
        Ok(credentials)
    }

    /// Reads `CF_EMAIL`, `CF_ACCOUNT_ID`, and `CF_GLOBAL_API_KEY`.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(
            env::var(ENV_ACCOUNT_EMAIL).unwrap_or_default(),
            env::var(ENV_ACCOUNT_ID).unwrap_or_default(),
            env::var(ENV_API_KEY).unwrap_or_default(),
        )
        .map_err(|err| {
            err.with_message(format!(
                "{ENV_ACCOUNT_EMAIL}, {ENV_ACCOUNT_ID}, and {ENV_API_KEY} must all be set"
            ))
        })
    }

    pub fn account_email(&self) -> &str {
        &self.account_email
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}
