//! Refresh token rotation engine.
//!
//! [`RotationService`] owns the credential lifecycle:
//!
//! - `issue_initial` mints the first access/refresh pair of a family
//! - `refresh` exchanges a live refresh credential for a new pair, revoking
//!   the old record and linking it to its successor in one atomic store call
//! - `revoke_one`, `revoke_all_for_subject` and `revoke_family` terminate
//!   sessions without linkage
//! - `logout` combines refresh revocation with access denylisting and never fails
//! - `authenticate` is the request-path gate for access credentials
//!
//! # Chain states
//!
//! ```text
//! Live ──refresh──▶ RotatedOut (revoked, replaced_by set)
//!   │
//!   ├──revoke────▶ Revoked (revoked, replaced_by unset)
//!   │
//!   └──time──────▶ Expired (no flag flip; fails validation)
//! ```
//!
//! # Time
//!
//! The current instant is read once per operation from the injected clock and
//! truncated to whole seconds, so record horizons match the second-granular
//! `iat`/`exp` claims of the credentials minted in the same call.

use std::future::Future;
use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::AuthResult;
use crate::clock::DynClock;
use crate::config::{TokenLifecycleConfig, to_time_duration};
use crate::error::AuthError;
use crate::revocation::DynRevocationCache;
use crate::storage::{RefreshTokenStorage, RotationOutcome, SubjectDirectory};
use crate::token::{CodecError, CredentialClaims, TokenCodec, TokenKind, hash_token};
use crate::types::{ClientContext, RefreshTokenRecord, SubjectClaims};

/// A freshly issued access/refresh pair.
#[derive(Clone)]
pub struct TokenPair {
    /// Raw access credential.
    pub access_token: String,

    /// When the access credential expires.
    pub access_expires_at: OffsetDateTime,

    /// Raw refresh credential. Only its hash is stored.
    pub refresh_token: String,

    /// When the refresh credential stops being usable (earlier horizon).
    pub refresh_expires_at: OffsetDateTime,

    /// Store record backing the refresh credential.
    pub record_id: Uuid,

    /// Family shared by every record descended from the same login.
    pub family_id: Uuid,
}

impl TokenPair {
    /// Access credential lifetime in whole seconds, relative to `now`.
    #[must_use]
    pub fn access_expires_in(&self, now: OffsetDateTime) -> i64 {
        (self.access_expires_at - now).whole_seconds().max(0)
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_token", &"[REDACTED]")
            .field("refresh_expires_at", &self.refresh_expires_at)
            .field("record_id", &self.record_id)
            .field("family_id", &self.family_id)
            .finish()
    }
}

/// Counters reported by [`RotationService::logout`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogoutOutcome {
    /// A live refresh record was revoked.
    pub refresh_revoked: bool,

    /// The access credential was added to the denylist.
    pub access_denylisted: bool,
}

/// The refresh token state machine.
pub struct RotationService {
    storage: Arc<dyn RefreshTokenStorage>,
    revocations: DynRevocationCache,
    subjects: Arc<dyn SubjectDirectory>,
    codec: Arc<TokenCodec>,
    clock: DynClock,
    config: TokenLifecycleConfig,
}

impl RotationService {
    /// Creates a new rotation service.
    #[must_use]
    pub fn new(
        storage: Arc<dyn RefreshTokenStorage>,
        revocations: DynRevocationCache,
        subjects: Arc<dyn SubjectDirectory>,
        codec: Arc<TokenCodec>,
        clock: DynClock,
        config: TokenLifecycleConfig,
    ) -> Self {
        Self {
            storage,
            revocations,
            subjects,
            codec,
            clock,
            config,
        }
    }

    /// Returns the lifecycle configuration.
    #[must_use]
    pub fn config(&self) -> &TokenLifecycleConfig {
        &self.config
    }

    // ========================================================================
    // Issuance and rotation
    // ========================================================================

    /// Mints the first pair of a new family for `subject_id`.
    ///
    /// # Errors
    ///
    /// - `SubjectInactive` if the subject is unknown, disabled or locked
    /// - `StoreUnavailable` if the directory or store fails or times out
    pub async fn issue_initial(
        &self,
        subject_id: &str,
        context: ClientContext,
    ) -> AuthResult<TokenPair> {
        let now = self.now();
        let subject = self.load_active_subject(subject_id).await?;

        let sliding = now.saturating_add(self.sliding_window());
        let absolute = now.saturating_add(self.absolute_lifetime());

        let (access_token, access_expires_at, refresh_token) =
            self.mint_pair(subject_id, &subject, now, sliding.min(absolute))?;

        let record = RefreshTokenRecord::new_family(
            subject_id,
            hash_token(&refresh_token),
            now,
            self.sliding_window(),
            self.absolute_lifetime(),
            context,
        );

        self.timed("insert", self.storage.insert(&record)).await?;

        tracing::info!(
            subject_id = %subject_id,
            record_id = %record.id,
            family_id = %record.family_id,
            "Issued new refresh token family"
        );

        Ok(TokenPair {
            access_token,
            access_expires_at,
            refresh_token,
            refresh_expires_at: record.effective_expires_at(),
            record_id: record.id,
            family_id: record.family_id,
        })
    }

    /// Exchanges a live refresh credential for a new pair.
    ///
    /// The old record is revoked and linked to its successor in one atomic
    /// store call. Of two concurrent calls presenting the same credential,
    /// exactly one succeeds; the other fails with `InvalidOrRevoked`.
    ///
    /// # Errors
    ///
    /// - `MalformedCredential` if the credential fails verification
    /// - `InvalidOrRevoked` if no live record matches (unknown, rotated, revoked)
    /// - `Expired` if either horizon has passed
    /// - `SubjectInactive` if the owning subject may no longer hold a session
    /// - `StoreUnavailable` if the store fails or times out
    pub async fn refresh(
        &self,
        raw_refresh: &str,
        context: ClientContext,
    ) -> AuthResult<TokenPair> {
        let now = self.now();

        // 1. Verify signature and kind, then hash
        self.verify_refresh_credential(raw_refresh)?;
        let token_hash = hash_token(raw_refresh);

        // 2. Look up the live record
        let Some(current) = self
            .timed("find_live_by_hash", self.storage.find_live_by_hash(&token_hash))
            .await?
        else {
            self.on_unknown_or_revoked(&token_hash, now).await;
            return Err(AuthError::InvalidOrRevoked);
        };

        // 3. Check both horizons
        if let Some(horizon) = current.expired_horizon(now) {
            tracing::debug!(
                record_id = %current.id,
                subject_id = %current.subject_id,
                horizon = %horizon,
                "Refresh token expired"
            );
            return Err(AuthError::expired(horizon));
        }

        // 4. Re-derive the subject's claims. Kept outside the store's
        // rotation transaction: the conditional update in step 7 alone
        // decides the winner.
        let subject = self.load_active_subject(&current.subject_id).await?;

        // 5. Mint the new pair
        let sliding = now.saturating_add(self.sliding_window());
        let (access_token, access_expires_at, refresh_token) = self.mint_pair(
            &current.subject_id,
            &subject,
            now,
            sliding.min(current.absolute_expires_at),
        )?;

        // 6. Build the successor
        let successor = current.successor(
            hash_token(&refresh_token),
            now,
            self.sliding_window(),
            context,
        );

        // 7. Revoke-and-link the old record and insert the successor atomically
        let outcome = self
            .timed("rotate", self.storage.rotate(current.id, &successor, now))
            .await?;

        if outcome == RotationOutcome::Superseded {
            tracing::warn!(
                record_id = %current.id,
                subject_id = %current.subject_id,
                family_id = %current.family_id,
                "Refresh token was rotated concurrently"
            );
            return Err(AuthError::InvalidOrRevoked);
        }

        tracing::debug!(
            old_record_id = %current.id,
            new_record_id = %successor.id,
            family_id = %successor.family_id,
            "Rotated refresh token"
        );

        // 8. Return the new credentials
        Ok(TokenPair {
            access_token,
            access_expires_at,
            refresh_token,
            refresh_expires_at: successor.effective_expires_at(),
            record_id: successor.id,
            family_id: successor.family_id,
        })
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Returns the live, unexpired record behind a refresh credential.
    ///
    /// Read-only: applies the lookup and horizon checks of [`refresh`](Self::refresh)
    /// without mutating anything.
    ///
    /// # Errors
    ///
    /// Same as `refresh` steps 1 to 3.
    pub async fn inspect(&self, raw_refresh: &str) -> AuthResult<RefreshTokenRecord> {
        let now = self.now();
        self.verify_refresh_credential(raw_refresh)?;

        let record = self
            .timed(
                "find_live_by_hash",
                self.storage.find_live_by_hash(&hash_token(raw_refresh)),
            )
            .await?
            .ok_or(AuthError::InvalidOrRevoked)?;

        match record.expired_horizon(now) {
            Some(horizon) => Err(AuthError::expired(horizon)),
            None => Ok(record),
        }
    }

    /// Returns `true` if the refresh credential would currently be accepted
    /// by [`refresh`](Self::refresh), subject checks aside.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures are errors; every rejection is `Ok(false)`.
    pub async fn is_valid(&self, raw_refresh: &str) -> AuthResult<bool> {
        match self.inspect(raw_refresh).await {
            Ok(_) => Ok(true),
            Err(e) if e.requires_reauthentication() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Lists the live sessions of a subject, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the store fails or times out.
    pub async fn list_active_for_subject(
        &self,
        subject_id: &str,
    ) -> AuthResult<Vec<RefreshTokenRecord>> {
        let now = self.now();
        self.timed(
            "list_active_for_subject",
            self.storage.list_active_for_subject(subject_id, now),
        )
        .await
    }

    // ========================================================================
    // Revocation
    // ========================================================================

    /// Terminally revokes the record behind a refresh credential.
    ///
    /// Best-effort and idempotent: unknown or already-revoked credentials and
    /// store failures are logged, never returned. Returns `true` if a live
    /// record was revoked by this call.
    pub async fn revoke_one(&self, raw_refresh: &str) -> bool {
        let now = self.now();
        let token_hash = hash_token(raw_refresh);

        let record = match self
            .timed("find_live_by_hash", self.storage.find_live_by_hash(&token_hash))
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!("Revoke requested for unknown or revoked refresh token");
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to look up refresh token for revocation");
                return false;
            }
        };

        match self
            .timed("mark_revoked", self.storage.mark_revoked(record.id, None, now))
            .await
        {
            Ok(revoked) => {
                if revoked {
                    tracing::info!(
                        record_id = %record.id,
                        subject_id = %record.subject_id,
                        "Revoked refresh token"
                    );
                }
                revoked
            }
            Err(e) => {
                tracing::warn!(
                    record_id = %record.id,
                    error = %e,
                    "Failed to revoke refresh token"
                );
                false
            }
        }
    }

    /// Terminally revokes every live record of a subject.
    ///
    /// Used for "log out everywhere" and credential-change flows.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the store fails or times out.
    pub async fn revoke_all_for_subject(&self, subject_id: &str) -> AuthResult<u64> {
        let now = self.now();
        let count = self
            .timed(
                "revoke_all_for_subject",
                self.storage.revoke_all_for_subject(subject_id, now),
            )
            .await?;

        tracing::info!(subject_id = %subject_id, count, "Revoked all refresh tokens for subject");
        Ok(count)
    }

    /// Terminally revokes every live record of a family.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the store fails or times out.
    pub async fn revoke_family(&self, family_id: Uuid) -> AuthResult<u64> {
        let now = self.now();
        let count = self
            .timed("revoke_family", self.storage.revoke_family(family_id, now))
            .await?;

        tracing::info!(family_id = %family_id, count, "Revoked refresh token family");
        Ok(count)
    }

    /// Ends a session.
    ///
    /// Revokes the refresh record (if a refresh credential is given) and
    /// denylists the access credential for its remaining lifetime (if given).
    /// Never fails: every error is logged and swallowed.
    pub async fn logout(
        &self,
        raw_refresh: Option<&str>,
        raw_access: Option<&str>,
    ) -> LogoutOutcome {
        let mut outcome = LogoutOutcome::default();

        if let Some(raw) = raw_refresh {
            outcome.refresh_revoked = self.revoke_one(raw).await;
        }

        if let Some(raw) = raw_access {
            outcome.access_denylisted = self.denylist_access(raw).await;
        }

        outcome
    }

    // ========================================================================
    // Access gate
    // ========================================================================

    /// Authenticates an access credential on the request path.
    ///
    /// The denylist is consulted first, for every presented credential, then
    /// the signature, expiry and kind are verified.
    ///
    /// # Errors
    ///
    /// - `InvalidOrRevoked` if the credential is denylisted
    /// - `Expired` or `MalformedCredential` if verification fails
    /// - `StoreUnavailable` if the denylist cannot be read (fails closed)
    pub async fn authenticate(&self, raw_access: &str) -> AuthResult<CredentialClaims> {
        let denylisted = self
            .timed("revocation_contains", self.revocations.contains(raw_access))
            .await?;
        if denylisted {
            tracing::debug!("Rejected denylisted access token");
            return Err(AuthError::InvalidOrRevoked);
        }

        Ok(self.codec.verify_kind(raw_access, TokenKind::Access)?)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn now(&self) -> OffsetDateTime {
        let now = self.clock.now();
        now.replace_nanosecond(0).unwrap_or(now)
    }

    fn sliding_window(&self) -> Duration {
        to_time_duration(self.config.sliding_window)
    }

    fn absolute_lifetime(&self) -> Duration {
        to_time_duration(self.config.absolute_lifetime)
    }

    /// Verifies signature and kind of a refresh credential.
    ///
    /// Expiry is left to the record horizons so the log reports which one fired.
    fn verify_refresh_credential(&self, raw_refresh: &str) -> AuthResult<()> {
        let claims = self.codec.verify_allow_expired(raw_refresh)?;
        if claims.token_use != TokenKind::Refresh {
            return Err(CodecError::invalid_claims("not a refresh credential").into());
        }
        Ok(())
    }

    fn mint_pair(
        &self,
        subject_id: &str,
        subject: &SubjectClaims,
        now: OffsetDateTime,
        refresh_expires_at: OffsetDateTime,
    ) -> AuthResult<(String, OffsetDateTime, String)> {
        let access_expires_at = now.saturating_add(to_time_duration(self.config.access_ttl));
        let access = self.codec.issue_until(
            subject_id,
            TokenKind::Access,
            &subject.roles,
            now,
            access_expires_at,
        )?;
        let refresh = self.codec.issue_until(
            subject_id,
            TokenKind::Refresh,
            &[],
            now,
            refresh_expires_at,
        )?;
        Ok((access.token, access_expires_at, refresh.token))
    }

    async fn load_active_subject(&self, subject_id: &str) -> AuthResult<SubjectClaims> {
        let claims = self
            .timed("subject_claims", self.subjects.subject_claims(subject_id))
            .await?;

        match claims {
            Some(claims) if claims.is_active() => Ok(claims),
            Some(claims) => {
                tracing::info!(
                    subject_id = %subject_id,
                    enabled = claims.enabled,
                    locked = claims.locked,
                    "Subject may not hold a session"
                );
                Err(AuthError::subject_inactive(subject_id))
            }
            None => {
                tracing::info!(subject_id = %subject_id, "Unknown subject");
                Err(AuthError::subject_inactive(subject_id))
            }
        }
    }

    /// Replay detection for a credential that missed the live lookup.
    ///
    /// Only active with `revoke_family_on_reuse`. A hit on a rotated-out
    /// record means the old credential was presented after its successor was
    /// issued, so the whole family is revoked. Failures are logged only; the
    /// caller is rejected either way.
    async fn on_unknown_or_revoked(&self, token_hash: &str, now: OffsetDateTime) {
        if !self.config.revoke_family_on_reuse {
            return;
        }

        let record = match self
            .timed("find_by_hash", self.storage.find_by_hash(token_hash))
            .await
        {
            Ok(Some(record)) if record.was_rotated() => record,
            Ok(_) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Replay check failed");
                return;
            }
        };

        match self
            .timed(
                "revoke_family",
                self.storage.revoke_family(record.family_id, now),
            )
            .await
        {
            Ok(count) => tracing::warn!(
                record_id = %record.id,
                family_id = %record.family_id,
                subject_id = %record.subject_id,
                revoked = count,
                "Rotated-out refresh token replayed; revoked token family"
            ),
            Err(e) => tracing::warn!(
                family_id = %record.family_id,
                error = %e,
                "Failed to revoke token family after replay"
            ),
        }
    }

    async fn denylist_access(&self, raw_access: &str) -> bool {
        let claims = match self.codec.verify_allow_expired(raw_access) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unverifiable access token on logout");
                return false;
            }
        };

        let Some(ttl) = claims.remaining_lifetime(self.now()) else {
            return false;
        };

        match self
            .timed("revocation_add", self.revocations.add(raw_access, ttl))
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    subject_id = %claims.sub,
                    ttl_secs = ttl.whole_seconds(),
                    backend = self.revocations.backend_name(),
                    "Denylisted access token"
                );
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to denylist access token");
                false
            }
        }
    }

    async fn timed<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = AuthResult<T>>,
    ) -> AuthResult<T> {
        match tokio::time::timeout(self.config.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, timeout = ?self.config.store_timeout, "Store call timed out");
                Err(AuthError::store_unavailable(format!("{operation} timed out")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::revocation::InMemoryRevocationCache;
    use crate::storage::{InMemoryRefreshTokenStorage, StaticSubjectDirectory};
    use crate::token::{SigningAlgorithm, SigningKey};
    use crate::error::ExpiryHorizon;
    use time::macros::datetime;

    struct Harness {
        clock: Arc<ManualClock>,
        store: Arc<InMemoryRefreshTokenStorage>,
        subjects: Arc<StaticSubjectDirectory>,
        service: RotationService,
    }

    fn harness(config: TokenLifecycleConfig) -> Harness {
        let clock = Arc::new(ManualClock::new(datetime!(2025-01-01 00:00 UTC)));
        let store = Arc::new(InMemoryRefreshTokenStorage::new());
        let subjects = Arc::new(StaticSubjectDirectory::new());
        subjects.upsert("alice", SubjectClaims::active(["user"]));

        let key = SigningKey::from_secret(SigningAlgorithm::HS256, b"rotation-tests").unwrap();
        let codec = Arc::new(TokenCodec::new(key, "tokenline-test", clock.clone()));
        let cache = Arc::new(InMemoryRevocationCache::new(clock.clone()));

        let service = RotationService::new(
            store.clone(),
            cache,
            subjects.clone(),
            codec,
            clock.clone(),
            config,
        );

        Harness {
            clock,
            store,
            subjects,
            service,
        }
    }

    #[tokio::test]
    async fn test_issue_initial_persists_hash_only() {
        let h = harness(TokenLifecycleConfig::default());
        let pair = h
            .service
            .issue_initial("alice", ClientContext::default())
            .await
            .unwrap();

        let record = h
            .store
            .find_by_id(pair.record_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.token_hash, hash_token(&pair.refresh_token));
        assert_ne!(record.token_hash, pair.refresh_token);
        assert_eq!(record.subject_id, "alice");
        assert_eq!(pair.access_expires_in(h.clock.now()), 15 * 60);
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_links() {
        let h = harness(TokenLifecycleConfig::default());
        let first = h
            .service
            .issue_initial("alice", ClientContext::default())
            .await
            .unwrap();

        h.clock.advance(Duration::days(1));
        let second = h
            .service
            .refresh(&first.refresh_token, ClientContext::default())
            .await
            .unwrap();

        let old = h.store.find_by_id(first.record_id).await.unwrap().unwrap();
        assert!(old.revoked);
        assert_eq!(old.replaced_by, Some(second.record_id));
        assert_eq!(second.family_id, first.family_id);
        assert!(h.service.is_valid(&second.refresh_token).await.unwrap());
        assert!(!h.service.is_valid(&first.refresh_token).await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_credential() {
        let h = harness(TokenLifecycleConfig::default());
        let pair = h
            .service
            .issue_initial("alice", ClientContext::default())
            .await
            .unwrap();

        let err = h
            .service
            .refresh(&pair.access_token, ClientContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MalformedCredential { .. }));
    }

    #[tokio::test]
    async fn test_refresh_reports_horizon() {
        let h = harness(TokenLifecycleConfig::default());
        let pair = h
            .service
            .issue_initial("alice", ClientContext::default())
            .await
            .unwrap();

        h.clock.advance(Duration::days(30));
        let err = h
            .service
            .refresh(&pair.refresh_token, ClientContext::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Expired {
                horizon: ExpiryHorizon::Sliding
            }
        ));
    }

    #[tokio::test]
    async fn test_refresh_rederives_roles() {
        let h = harness(TokenLifecycleConfig::default());
        let pair = h
            .service
            .issue_initial("alice", ClientContext::default())
            .await
            .unwrap();
        let claims = h.service.authenticate(&pair.access_token).await.unwrap();
        assert_eq!(claims.roles, vec!["user".to_string()]);

        h.subjects.set_roles("alice", ["viewer"]);
        let next = h
            .service
            .refresh(&pair.refresh_token, ClientContext::default())
            .await
            .unwrap();
        let claims = h.service.authenticate(&next.access_token).await.unwrap();
        assert_eq!(claims.roles, vec!["viewer".to_string()]);
    }

    #[tokio::test]
    async fn test_locked_subject_cannot_refresh() {
        let h = harness(TokenLifecycleConfig::default());
        let pair = h
            .service
            .issue_initial("alice", ClientContext::default())
            .await
            .unwrap();

        h.subjects.set_locked("alice", true);
        let err = h
            .service
            .refresh(&pair.refresh_token, ClientContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SubjectInactive { .. }));

        // Nothing was mutated.
        assert!(h.service.is_valid(&pair.refresh_token).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_subject_cannot_log_in() {
        let h = harness(TokenLifecycleConfig::default());
        let err = h
            .service
            .issue_initial("mallory", ClientContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SubjectInactive { .. }));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_revoke_one_is_idempotent() {
        let h = harness(TokenLifecycleConfig::default());
        let pair = h
            .service
            .issue_initial("alice", ClientContext::default())
            .await
            .unwrap();

        assert!(h.service.revoke_one(&pair.refresh_token).await);
        assert!(!h.service.revoke_one(&pair.refresh_token).await);
        assert!(!h.service.revoke_one("never-issued").await);

        let record = h.store.find_by_id(pair.record_id).await.unwrap().unwrap();
        assert!(record.revoked);
        assert!(record.replaced_by.is_none());
    }

    #[tokio::test]
    async fn test_replay_without_family_revocation() {
        let h = harness(TokenLifecycleConfig::default());
        let first = h
            .service
            .issue_initial("alice", ClientContext::default())
            .await
            .unwrap();
        let second = h
            .service
            .refresh(&first.refresh_token, ClientContext::default())
            .await
            .unwrap();

        let err = h
            .service
            .refresh(&first.refresh_token, ClientContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrRevoked));

        // The live tip is untouched.
        assert!(h.service.is_valid(&second.refresh_token).await.unwrap());
    }

    #[tokio::test]
    async fn test_replay_revokes_family_when_enabled() {
        let h = harness(TokenLifecycleConfig {
            revoke_family_on_reuse: true,
            ..TokenLifecycleConfig::default()
        });
        let first = h
            .service
            .issue_initial("alice", ClientContext::default())
            .await
            .unwrap();
        let second = h
            .service
            .refresh(&first.refresh_token, ClientContext::default())
            .await
            .unwrap();

        let err = h
            .service
            .refresh(&first.refresh_token, ClientContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrRevoked));
        assert!(!h.service.is_valid(&second.refresh_token).await.unwrap());

        // Logout-revoked (unlinked) records do not trigger cascade.
        let other = h
            .service
            .issue_initial("alice", ClientContext::default())
            .await
            .unwrap();
        let sibling = h
            .service
            .issue_initial("alice", ClientContext::default())
            .await
            .unwrap();
        h.service.revoke_one(&other.refresh_token).await;
        let _ = h
            .service
            .refresh(&other.refresh_token, ClientContext::default())
            .await;
        assert!(h.service.is_valid(&sibling.refresh_token).await.unwrap());
    }

    #[tokio::test]
    async fn test_logout_denylists_access_for_remaining_lifetime() {
        let h = harness(TokenLifecycleConfig::default());
        let pair = h
            .service
            .issue_initial("alice", ClientContext::default())
            .await
            .unwrap();

        h.clock.advance(Duration::minutes(5));
        let outcome = h
            .service
            .logout(Some(&pair.refresh_token), Some(&pair.access_token))
            .await;
        assert!(outcome.refresh_revoked);
        assert!(outcome.access_denylisted);

        assert!(matches!(
            h.service.authenticate(&pair.access_token).await.unwrap_err(),
            AuthError::InvalidOrRevoked
        ));
        assert!(!h.service.is_valid(&pair.refresh_token).await.unwrap());

        // Past its natural expiry the credential is rejected as expired.
        h.clock.advance(Duration::minutes(10));
        assert!(matches!(
            h.service.authenticate(&pair.access_token).await.unwrap_err(),
            AuthError::Expired {
                horizon: ExpiryHorizon::Credential
            }
        ));
    }

    #[tokio::test]
    async fn test_logout_never_fails() {
        let h = harness(TokenLifecycleConfig::default());
        let outcome = h.service.logout(Some("garbage"), Some("garbage")).await;
        assert_eq!(outcome, LogoutOutcome::default());

        let outcome = h.service.logout(None, None).await;
        assert_eq!(outcome, LogoutOutcome::default());
    }

    #[tokio::test]
    async fn test_authenticate_rejects_refresh_credential() {
        let h = harness(TokenLifecycleConfig::default());
        let pair = h
            .service
            .issue_initial("alice", ClientContext::default())
            .await
            .unwrap();

        let err = h
            .service
            .authenticate(&pair.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MalformedCredential { .. }));
    }

    #[tokio::test]
    async fn test_list_and_bulk_revoke() {
        let h = harness(TokenLifecycleConfig::default());
        let a = h
            .service
            .issue_initial("alice", ClientContext::new(Some("phone".into()), None))
            .await
            .unwrap();
        h.service
            .issue_initial("alice", ClientContext::new(Some("laptop".into()), None))
            .await
            .unwrap();

        assert_eq!(
            h.service.list_active_for_subject("alice").await.unwrap().len(),
            2
        );

        assert_eq!(h.service.revoke_family(a.family_id).await.unwrap(), 1);
        assert_eq!(h.service.revoke_all_for_subject("alice").await.unwrap(), 1);
        assert!(
            h.service
                .list_active_for_subject("alice")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_token_pair_debug_redacts_credentials() {
        let pair = TokenPair {
            access_token: "secret-access".to_string(),
            access_expires_at: datetime!(2025-01-01 00:15 UTC),
            refresh_token: "secret-refresh".to_string(),
            refresh_expires_at: datetime!(2025-01-31 00:00 UTC),
            record_id: Uuid::nil(),
            family_id: Uuid::nil(),
        };
        let debug = format!("{pair:?}");
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("[REDACTED]"));
    }
}
