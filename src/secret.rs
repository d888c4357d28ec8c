use std::fmt;

/// Holds secret key material so it cannot reach logs by accident.
///
/// `Debug` and `Display` always print `[REDACTED]`. The value is reachable
/// only through [`expose_secret`](Self::expose_secret).
///
/// # Examples
///
/// ```
/// use policy_guard::Secret;
///
/// let key = Secret::new(b"hmac-key".to_vec());
/// assert_eq!(format!("{:?}", key), "[REDACTED]");
/// assert_eq!(key.expose_secret(), b"hmac-key");
/// ```
// Do not derive Clone, Copy, Debug or Default here. Share a secret through
// an `Arc<Secret<T>>` instead of duplicating the key material.
pub struct Secret<T> {
    inner: T,
}

impl<T> Secret<T> {
    /// Wraps a sensitive value.
    pub fn new(value: T) -> Self {
        Self { inner: value }
    }

    /// Returns the wrapped value. Callers must not log the result.
    pub fn expose_secret(&self) -> &T {
        &self.inner
    }
}

impl<T> From<T> for Secret<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}
