//! Credential-delivery conventions a backend can be configured with.

use std::fmt;
use std::str::FromStr;

use super::trait_def::BackendError;

/// Which credential convention a backend injects into argv and environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMode {
    /// Use the tool's own logged-in subscription; API keys are stripped.
    Subscription,
    /// Use an API key delivered through the environment.
    ApiKey,
}

impl AuthMode {
    pub const ALL: [AuthMode; 2] = [AuthMode::Subscription, AuthMode::ApiKey];

    pub fn as_str(self) -> &'static str {
        match self {
            AuthMode::Subscription => "subscription",
            AuthMode::ApiKey => "api_key",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = BackendError;

    /// Accepts `subscription`, `api_key`, `api-key` and `apikey`,
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subscription" => Ok(AuthMode::Subscription),
            "api_key" | "api-key" | "apikey" => Ok(AuthMode::ApiKey),
            _ => Err(BackendError::UnknownAuthMode(s.to_string())),
        }
    }
}
