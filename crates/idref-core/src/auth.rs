//! Caller credentials.

use std::fmt;

use zeroize::Zeroizing;

use crate::error::ArgumentError;

/// A user's token together with the user name it was issued to.
///
/// The service framework validates the token before a handler set is
/// created, so the user name is trusted as-is. The token is wiped from
/// memory on drop and never appears in `Debug` output.
#[derive(Clone)]
pub struct AuthToken {
    token: Zeroizing<String>,
    user_name: String,
}

impl AuthToken {
    pub fn new(token: impl Into<String>, user_name: impl Into<String>) -> Result<Self, ArgumentError> {
        let token = Zeroizing::new(token.into());
        let user_name = user_name.into();
        if token.trim().is_empty() {
            return Err(ArgumentError::new("token cannot be null or whitespace only"));
        }
        if user_name.trim().is_empty() {
            return Err(ArgumentError::new("user name cannot be null or whitespace only"));
        }
        Ok(Self { token, user_name })
    }

    pub fn token(&self) -> &str {
        self.token.as_str()
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"[REDACTED]")
            .field("user_name", &self.user_name)
            .finish()
    }
}
