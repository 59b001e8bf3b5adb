use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// API key presented to the authorization service as `x-api-key`.
///
/// The value is wiped on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl From<String> for Credential {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Who is asking: an optional user id plus the credential used on their
/// behalf. A channel or permission answer is only valid for the identity
/// it was obtained with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Option<String>,
    pub credential: Credential,
}

impl Identity {
    pub fn new(credential: impl Into<Credential>, user_id: Option<String>) -> Self {
        Self {
            user_id,
            credential: credential.into(),
        }
    }

    pub fn anonymous(credential: impl Into<Credential>) -> Self {
        Self::new(credential, None)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_credential() {
        let identity = Identity::new("super-secret", Some("u1".into()));
        let rendered = format!("{identity:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("u1"));
    }

    #[test]
    fn identities_compare_by_user_and_credential() {
        let a = Identity::new("key", Some("u1".into()));
        assert_eq!(a, Identity::new("key", Some("u1".into())));
        assert_ne!(a, Identity::new("key", Some("u2".into())));
        assert_ne!(a, Identity::new("other", Some("u1".into())));
        assert!(!Identity::anonymous("key").is_signed_in());
    }
}
