use std::fmt;

/// Error from the identity collaborator or the authentication handshake.
///
/// The `Display` form is the client-visible reason carried by the
/// `unauthorized` message before the connection is closed.
#[derive(Debug, Clone)]
pub struct AuthError {
    pub message: String,
}

impl AuthError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AuthError {}

/// Error from the broadcast bus.
///
/// Transient errors are logged and the operation abandoned. A fatal error
/// means the shared transport is gone for good and the process must exit
/// rather than keep serving a partially connected fleet.
#[derive(Debug, Clone)]
pub struct BusError {
    pub message: String,
    fatal: bool,
}

impl BusError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BusError {}

/// Error from the shared key-value store.
#[derive(Debug, Clone)]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        tracing::error!(%err, "store error during authentication");
        Self::new("Authentication service unavailable")
    }
}
