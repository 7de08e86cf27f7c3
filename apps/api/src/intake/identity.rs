//! Advisory identity attached to a submission.
//!
//! Identity is never authenticated. A malformed email silently becomes
//! `Anonymous` rather than rejecting the request.

const MIN_EMAIL_LEN: usize = 6;
const ANONYMOUS_KEY: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Email(String),
    Anonymous,
}

impl Identity {
    /// Lower-cases and validates an optional email. Never fails.
    pub fn from_email(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Identity::Anonymous;
        };
        let email = raw.trim().to_lowercase();

        if email.chars().count() < MIN_EMAIL_LEN || email.chars().any(char::is_whitespace) {
            return Identity::Anonymous;
        }
        match email.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
            {
                Identity::Email(email)
            }
            _ => Identity::Anonymous,
        }
    }

    /// Quota subject string. The anonymous marker cannot collide with an
    /// email because it contains no `@`.
    pub fn key(&self) -> &str {
        match self {
            Identity::Email(e) => e,
            Identity::Anonymous => ANONYMOUS_KEY,
        }
    }

    /// Rebuilds an identity from a stored subject string.
    pub fn from_key(key: &str) -> Self {
        if key == ANONYMOUS_KEY {
            Identity::Anonymous
        } else {
            Identity::from_email(Some(key))
        }
    }

    /// `"email"` or `"anonymous"`; safe to log.
    pub fn kind(&self) -> &'static str {
        match self {
            Identity::Email(_) => "email",
            Identity::Anonymous => "anonymous",
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }
}
