//! Credential pairing for authenticated transfers.

use std::fmt;

use super::error::TransferError;

/// Username/password pair used for HTTP basic auth or FTP login.
///
/// Credentials are always complete: a username without a password (or the
/// reverse) is a configuration error, rejected by [`Credentials::from_parts`]
/// before any network I/O happens.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Builds credentials from optional parts.
    ///
    /// Both present yields `Some`, both absent yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Config`] when only one of the two parts is
    /// supplied.
    pub fn from_parts(
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Option<Self>, TransferError> {
        match (username, password) {
            (Some(username), Some(password)) => Ok(Some(Self { username, password })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(TransferError::config(
                "username supplied without a password",
            )),
            (None, Some(_)) => Err(TransferError::config(
                "password supplied without a username",
            )),
        }
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

// Manual Debug so passwords never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
