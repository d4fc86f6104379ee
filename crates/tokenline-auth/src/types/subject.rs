//! Identity data the engine re-reads on every rotation.

use serde::{Deserialize, Serialize};

/// Current claims of a subject, as reported by the identity directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectClaims {
    /// Roles embedded into newly minted access credentials.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Whether the account is enabled.
    pub enabled: bool,

    /// Whether the account is locked.
    #[serde(default)]
    pub locked: bool,
}

impl SubjectClaims {
    /// Creates claims for an enabled, unlocked subject.
    #[must_use]
    pub fn active<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            enabled: true,
            locked: false,
        }
    }

    /// Returns `true` if the subject may hold a session.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && !self.locked
    }
}
