//! Session token storage

use serde::{Deserialize, Serialize};

/// Stored session token. Macrochat tokens carry no expiry; a token stays
/// usable until the remote rejects it or the user logs out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    /// Account the token was issued for.
    #[serde(default)]
    pub email: Option<String>,
}

impl StoredToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Somewhere a session token can be kept between runs.
pub trait TokenStore {
    fn session_token(&self) -> Option<StoredToken>;
    fn set_session_token(&mut self, token: StoredToken);
    fn clear_tokens(&mut self);

    /// The token, unless missing or blank.
    fn valid_session_token(&self) -> Option<String> {
        self.session_token()
            .map(|t| t.token)
            .filter(|t| !t.trim().is_empty())
    }

    /// Whether a usable token was issued for `email`.
    fn logged_in_as(&self, email: &str) -> bool {
        self.valid_session_token().is_some()
            && self
                .session_token()
                .and_then(|t| t.email)
                .is_some_and(|e| e.eq_ignore_ascii_case(email))
    }
}
