//! Identity lookup consumed by the rotation engine.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::AuthResult;
use crate::types::SubjectClaims;

/// Source of a subject's current roles and account state.
///
/// Called on every issuance and rotation. Implementations must not cache
/// across calls: a role downgrade or a lock takes effect on the next rotation.
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    /// Returns the subject's current claims, or `None` if the subject is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is unavailable.
    async fn subject_claims(&self, subject_id: &str) -> AuthResult<Option<SubjectClaims>>;
}

/// In-memory directory, mainly for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct StaticSubjectDirectory {
    subjects: RwLock<HashMap<String, SubjectClaims>>,
}

impl StaticSubjectDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a subject.
    pub fn upsert(&self, subject_id: impl Into<String>, claims: SubjectClaims) {
        self.subjects.write().insert(subject_id.into(), claims);
    }

    /// Removes a subject. Returns `true` if it existed.
    pub fn remove(&self, subject_id: &str) -> bool {
        self.subjects.write().remove(subject_id).is_some()
    }

    /// Replaces a subject's roles, keeping its account state.
    pub fn set_roles<I, S>(&self, subject_id: &str, roles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(claims) = self.subjects.write().get_mut(subject_id) {
            claims.roles = roles.into_iter().map(Into::into).collect();
        }
    }

    /// Sets a subject's locked flag.
    pub fn set_locked(&self, subject_id: &str, locked: bool) {
        if let Some(claims) = self.subjects.write().get_mut(subject_id) {
            claims.locked = locked;
        }
    }
}

#[async_trait]
impl SubjectDirectory for StaticSubjectDirectory {
    async fn subject_claims(&self, subject_id: &str) -> AuthResult<Option<SubjectClaims>> {
        Ok(self.subjects.read().get(subject_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    #[test]
    fn test_static_directory_lookup() {
        let directory = StaticSubjectDirectory::new();
        directory.upsert("alice", SubjectClaims::active(["user"]));

        let claims = block_on(directory.subject_claims("alice")).unwrap().unwrap();
        assert!(claims.is_active());
        assert!(block_on(directory.subject_claims("bob")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_static_directory_mutations() {
        let directory = StaticSubjectDirectory::new();
        directory.upsert("alice", SubjectClaims::active(["admin"]));

        directory.set_roles("alice", ["user"]);
        directory.set_locked("alice", true);

        let claims = directory.subject_claims("alice").await.unwrap().unwrap();
        assert_eq!(claims.roles, vec!["user".to_string()]);
        assert!(!claims.is_active());

        assert!(directory.remove("alice"));
        assert!(!directory.remove("alice"));
    }
}
