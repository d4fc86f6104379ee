//! Refresh token record.
//!
//! One record exists per issued refresh credential. Records are only ever
//! created (at login or rotation), flipped to revoked, or deleted by cleanup.
//! Sliding extension always happens by producing a successor record, never by
//! moving an existing record's expiry.
//!
//! # Security
//!
//! - The raw credential is never stored, only its SHA-256 digest
//! - `revoked` is one-way; no code path un-revokes
//! - `replaced_by` is set exactly when revocation was caused by rotation

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::ExpiryHorizon;

/// A persisted refresh credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRecord {
    /// Unique identifier for this record.
    pub id: Uuid,

    /// Identifier shared by every record descended from one login.
    pub family_id: Uuid,

    /// Owning subject.
    pub subject_id: String,

    /// SHA-256 hash of the raw credential. Unique across all records.
    pub token_hash: String,

    /// When the credential was minted.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// Invalid at or after this instant unless rotated first.
    #[serde(with = "time::serde::rfc3339")]
    pub sliding_expires_at: OffsetDateTime,

    /// Fixed at first issuance of the family and copied into every successor.
    #[serde(with = "time::serde::rfc3339")]
    pub absolute_expires_at: OffsetDateTime,

    /// Whether the record has been revoked (by rotation or explicitly).
    pub revoked: bool,

    /// The record that superseded this one through rotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<Uuid>,

    /// Opaque device description captured at issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<String>,

    /// Opaque source address captured at issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,

    /// Audit timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Audit timestamp. Bumped on revocation; drives retention.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Descriptive metadata captured when a credential is issued.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    /// Opaque device description (for example a user agent).
    pub device_info: Option<String>,

    /// Opaque source address.
    pub source_address: Option<String>,
}

impl ClientContext {
    /// Creates a context from optional device and address strings.
    #[must_use]
    pub fn new(device_info: Option<String>, source_address: Option<String>) -> Self {
        Self {
            device_info,
            source_address,
        }
    }

    /// Returns `true` if neither field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.device_info.is_none() && self.source_address.is_none()
    }
}

impl RefreshTokenRecord {
    /// Creates the first record of a new family.
    #[must_use]
    pub fn new_family(
        subject_id: impl Into<String>,
        token_hash: impl Into<String>,
        now: OffsetDateTime,
        sliding_window: Duration,
        absolute_lifetime: Duration,
        context: ClientContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            token_hash: token_hash.into(),
            issued_at: now,
            sliding_expires_at: now.saturating_add(sliding_window),
            absolute_expires_at: now.saturating_add(absolute_lifetime),
            revoked: false,
            replaced_by: None,
            device_info: context.device_info,
            source_address: context.source_address,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates the successor of this record for a rotation at `now`.
    ///
    /// The sliding horizon is reset, the absolute horizon and family are
    /// inherited unchanged. Device and address are carried forward unless the
    /// caller supplies fresher values.
    #[must_use]
    pub fn successor(
        &self,
        token_hash: impl Into<String>,
        now: OffsetDateTime,
        sliding_window: Duration,
        context: ClientContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            family_id: self.family_id,
            subject_id: self.subject_id.clone(),
            token_hash: token_hash.into(),
            issued_at: now,
            sliding_expires_at: now.saturating_add(sliding_window),
            absolute_expires_at: self.absolute_expires_at,
            revoked: false,
            replaced_by: None,
            device_info: context.device_info.or_else(|| self.device_info.clone()),
            source_address: context
                .source_address
                .or_else(|| self.source_address.clone()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if the sliding horizon has been reached.
    #[must_use]
    pub fn is_sliding_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.sliding_expires_at
    }

    /// Returns `true` if the absolute horizon has been reached.
    #[must_use]
    pub fn is_absolute_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.absolute_expires_at
    }

    /// Returns which horizon, if any, rejects this record at `now`.
    ///
    /// Both horizons are always evaluated.
    #[must_use]
    pub fn expired_horizon(&self, now: OffsetDateTime) -> Option<ExpiryHorizon> {
        ExpiryHorizon::crossed(self.is_sliding_expired(now), self.is_absolute_expired(now))
    }

    /// Returns `true` if the record is unrevoked and within both horizons.
    #[must_use]
    pub fn is_live(&self, now: OffsetDateTime) -> bool {
        !self.revoked && self.expired_horizon(now).is_none()
    }

    /// Returns `true` if the record was revoked by rotation.
    #[must_use]
    pub fn was_rotated(&self) -> bool {
        self.revoked && self.replaced_by.is_some()
    }

    /// The instant the record stops being usable: the earlier of both horizons.
    #[must_use]
    pub fn effective_expires_at(&self) -> OffsetDateTime {
        self.sliding_expires_at.min(self.absolute_expires_at)
    }

    /// Returns `true` if cleanup may delete this record.
    ///
    /// Unrevoked records go once either horizon has passed. Revoked records
    /// are kept until their last update is older than `revocation_cutoff`.
    #[must_use]
    pub fn is_collectable(&self, now: OffsetDateTime, revocation_cutoff: OffsetDateTime) -> bool {
        if self.revoked {
            self.updated_at < revocation_cutoff
        } else {
            self.expired_horizon(now).is_some()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const DAY0: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);

    fn record() -> RefreshTokenRecord {
        RefreshTokenRecord::new_family(
            "user-1",
            "hash-0",
            DAY0,
            Duration::days(30),
            Duration::days(90),
            ClientContext::new(Some("firefox".to_string()), Some("10.0.0.1".to_string())),
        )
    }

    #[test]
    fn test_new_family_horizons() {
        let r = record();
        assert_eq!(r.sliding_expires_at, DAY0 + Duration::days(30));
        assert_eq!(r.absolute_expires_at, DAY0 + Duration::days(90));
        assert!(!r.revoked);
        assert!(r.replaced_by.is_none());
        assert_eq!(r.created_at, r.updated_at);
    }

    #[test]
    fn test_successor_inherits_absolute_and_family() {
        let r = record();
        let at = DAY0 + Duration::days(15);
        let next = r.successor("hash-1", at, Duration::days(30), ClientContext::default());

        assert_ne!(next.id, r.id);
        assert_eq!(next.family_id, r.family_id);
        assert_eq!(next.subject_id, r.subject_id);
        assert_eq!(next.sliding_expires_at, at + Duration::days(30));
        assert_eq!(next.absolute_expires_at, r.absolute_expires_at);
        assert_eq!(next.device_info.as_deref(), Some("firefox"));
        assert_eq!(next.source_address.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_successor_prefers_fresh_context() {
        let r = record();
        let next = r.successor(
            "hash-1",
            DAY0,
            Duration::days(30),
            ClientContext::new(None, Some("192.168.1.5".to_string())),
        );
        assert_eq!(next.device_info.as_deref(), Some("firefox"));
        assert_eq!(next.source_address.as_deref(), Some("192.168.1.5"));
    }

    #[test]
    fn test_expiry_on_both_axes() {
        let mut r = record();

        // Sliding in the future, absolute in the past.
        r.sliding_expires_at = DAY0 + Duration::days(110);
        let at = DAY0 + Duration::days(90);
        assert_eq!(r.expired_horizon(at), Some(ExpiryHorizon::Absolute));
        assert!(!r.is_live(at));

        // Absolute in the future, sliding in the past.
        let r = record();
        let at = DAY0 + Duration::days(31);
        assert_eq!(r.expired_horizon(at), Some(ExpiryHorizon::Sliding));
        assert!(!r.is_live(at));

        assert!(r.is_live(DAY0 + Duration::days(29)));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let r = record();
        assert!(r.is_live(r.sliding_expires_at - Duration::seconds(1)));
        assert!(!r.is_live(r.sliding_expires_at));
    }

    #[test]
    fn test_was_rotated() {
        let mut r = record();
        assert!(!r.was_rotated());

        r.revoked = true;
        assert!(!r.was_rotated());

        r.replaced_by = Some(Uuid::new_v4());
        assert!(r.was_rotated());
    }

    #[test]
    fn test_is_collectable() {
        let now = DAY0 + Duration::days(10);
        let cutoff = now - Duration::days(7);

        let live = record();
        assert!(!live.is_collectable(now, cutoff));

        let mut recently_revoked = record();
        recently_revoked.revoked = true;
        recently_revoked.updated_at = DAY0 + Duration::days(5);
        assert!(!recently_revoked.is_collectable(now, cutoff));

        let mut stale_revoked = record();
        stale_revoked.revoked = true;
        stale_revoked.updated_at = DAY0 + Duration::days(1);
        assert!(stale_revoked.is_collectable(now, cutoff));

        assert!(live.is_collectable(DAY0 + Duration::days(30), cutoff));
    }

    #[test]
    fn test_serialization() {
        let r = record();
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("slidingExpiresAt"));
        let back: RefreshTokenRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
