//! Typed entity records.
//!
//! The store persists JSON; field names are camelCase and pinned by
//! tests so a deployment that already has entities in its store keeps
//! working across the rewrite. Requests are validated into these
//! structs once at the boundary; nothing below this layer accepts an
//! untyped mapping.

use serde::{Deserialize, Serialize};

/// A two-party call, created on initiation.
///
/// Lives under `call.<callId>` with the fixed configured call
/// duration as its TTL; deleted explicitly on termination or left to
/// expire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    /// Call identifier, also the key suffix.
    pub call_id: String,
    /// Calling user (HMAC identity).
    pub caller_id: String,
    /// Owner of the call resource (HMAC identity); indexed under
    /// `userCalls.<userMac>`.
    pub user_mac: String,
    /// Media session identifier handed to both parties.
    pub session_id: String,
    /// Token the callee presents to pick up.
    pub callee_token: String,
    /// Creation time, unix seconds. Listing order.
    pub timestamp: i64,
}

/// A shareable call link minted by a user.
///
/// Lives under `callurl.<urlId>` with TTL `expires - now`; indexed
/// under `userUrls.<userMac>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallUrl {
    /// URL token, also the key suffix.
    pub call_url_id: String,
    /// Minting user (HMAC identity).
    pub user_mac: String,
    /// Calling party the link was minted for, if one was named.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    /// Free-form issuer label shown to the callee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Creation time, unix seconds. Listing order.
    pub timestamp: i64,
    /// Absolute expiry, unix seconds.
    #[serde(rename = "expires")]
    pub expires_at: i64,
}

/// Owner edits to a call url; absent fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct CallUrlPatch {
    pub caller_id: Option<String>,
    pub issuer: Option<String>,
    /// New absolute expiry, unix seconds; re-derives the TTL.
    pub expires_at: Option<i64>,
}

impl CallUrl {
    /// Merge a patch into this record. The token, owner, and creation
    /// time are immutable.
    pub fn apply(&mut self, patch: CallUrlPatch) {
        if let Some(caller_id) = patch.caller_id {
            self.caller_id = Some(caller_id);
        }
        if let Some(issuer) = patch.issuer {
            self.issuer = Some(issuer);
        }
        if let Some(expires_at) = patch.expires_at {
            self.expires_at = expires_at;
        }
    }
}

/// A room.
///
/// Lives under `room.<roomToken>` with TTL `expiresAt - updateTime`,
/// recomputed on every mutation; indexed under `userRooms.<userMac>`.
/// `updateTime` doubles as the monotonic version delivered by the
/// push fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Room token, also the key suffix.
    pub room_token: String,
    /// Owning user (HMAC identity).
    pub room_owner_hmac: String,
    /// Owner-assigned display name.
    pub room_name: String,
    /// Owner-configured participant cap.
    pub max_size: u32,
    /// Media session identifier shared by all participants.
    pub session_id: String,
    /// Media API key for the session.
    pub api_key: String,
    /// Creation time, unix seconds.
    pub creation_time: i64,
    /// Last mutation time, unix seconds. Listing order and fan-out
    /// version.
    pub update_time: i64,
    /// Absolute expiry, unix seconds.
    pub expires_at: i64,
}

/// A participant as seen by callers: no expiry metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomParticipant {
    /// The participant's session identity (HMAC); hash field under
    /// `roomparticipants.<roomToken>`.
    pub hawk_id_hmac: String,
    /// User-friendly display name.
    pub display_name: String,
    /// The largest room population this participant's client can
    /// handle. Feeds the effective-capacity computation.
    pub client_max_size: u32,
    /// Joining user (HMAC identity), absent for anonymous joins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_mac: Option<String>,
}

/// The stored form of a participant: the public record plus its
/// embedded expiry. Participants share one container key, so native
/// key TTL cannot apply per entry; the expiry is read back and
/// filtered at every use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredParticipant {
    #[serde(flatten)]
    pub participant: RoomParticipant,
    /// Absolute expiry, unix seconds.
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
}

impl StoredParticipant {
    /// Whether this entry still counts at `now`.
    #[must_use]
    pub fn is_active(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

/// Derived credentials for an authenticated session: the stored key
/// material plus the MAC algorithm clients must use with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    /// Stored key material.
    pub key: String,
    /// MAC algorithm name, always `sha256`.
    pub algorithm: String,
}

impl SessionCredentials {
    /// Credentials for a stored key under the only supported
    /// algorithm.
    #[must_use]
    pub fn sha256(key: String) -> Self {
        Self {
            key,
            algorithm: "sha256".to_string(),
        }
    }
}

/// Which side of a call a connected-device counter tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Caller,
    Callee,
}

impl DeviceType {
    /// Key-segment spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceType::Caller => "caller",
            DeviceType::Callee => "callee",
        }
    }
}

/// Simple-push notification topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushTopic {
    Calls,
    Rooms,
}

impl PushTopic {
    /// All recognized topics.
    pub const ALL: [PushTopic; 2] = [PushTopic::Calls, PushTopic::Rooms];

    /// Hash-field spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PushTopic::Calls => "calls",
            PushTopic::Rooms => "rooms",
        }
    }
}

/// Topic→URL mapping registered by one client device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimplePushUrls {
    pub calls: Option<String>,
    pub rooms: Option<String>,
}

impl SimplePushUrls {
    /// Iterate over the topics that carry a URL.
    pub fn entries(&self) -> impl Iterator<Item = (PushTopic, &str)> {
        self.calls
            .as_deref()
            .map(|url| (PushTopic::Calls, url))
            .into_iter()
            .chain(self.rooms.as_deref().map(|url| (PushTopic::Rooms, url)))
    }
}

/// Deduplicated push endpoints for a user, across all their devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushUrls {
    pub calls: Vec<String>,
    pub rooms: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn room_wire_format_is_pinned() {
        let room = Room {
            room_token: "QzBbvGmI".to_string(),
            room_owner_hmac: "abc123".to_string(),
            room_name: "UX planning".to_string(),
            max_size: 5,
            session_id: "2_MX4".to_string(),
            api_key: "4468asd".to_string(),
            creation_time: 1405517546,
            update_time: 1405517546,
            expires_at: 1405546346,
        };
        let json: serde_json::Value = serde_json::to_value(&room).unwrap();

        // Any existing deployment reads these exact names.
        for field in [
            "roomToken",
            "roomOwnerHmac",
            "roomName",
            "maxSize",
            "sessionId",
            "apiKey",
            "creationTime",
            "updateTime",
            "expiresAt",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
    }

    #[test]
    fn call_url_uses_legacy_expires_name() {
        let url = CallUrl {
            call_url_id: "_nxD4V4FflQ".to_string(),
            user_mac: "abc123".to_string(),
            caller_id: None,
            issuer: None,
            timestamp: 1405517546,
            expires_at: 1405546346,
        };
        let json: serde_json::Value = serde_json::to_value(&url).unwrap();
        assert_eq!(json.get("expires").unwrap(), 1405546346);
        assert!(json.get("expiresAt").is_none());
        // Unset optional fields are not persisted.
        assert!(json.get("callerId").is_none());
        assert!(json.get("issuer").is_none());
    }

    #[test]
    fn call_url_patch_merges_only_present_fields() {
        let mut url = CallUrl {
            call_url_id: "_nxD4V4FflQ".to_string(),
            user_mac: "abc123".to_string(),
            caller_id: Some("alexis".to_string()),
            issuer: None,
            timestamp: 1405517546,
            expires_at: 1405546346,
        };

        url.apply(CallUrlPatch {
            caller_id: None,
            issuer: Some("UX planning".to_string()),
            expires_at: Some(1405549946),
        });

        assert_eq!(url.caller_id.as_deref(), Some("alexis"));
        assert_eq!(url.issuer.as_deref(), Some("UX planning"));
        assert_eq!(url.expires_at, 1405549946);
        assert_eq!(url.timestamp, 1405517546);

        // An empty patch changes nothing.
        let before = url.clone();
        url.apply(CallUrlPatch::default());
        assert_eq!(url, before);
    }

    #[test]
    fn stored_participant_flattens_and_filters() {
        let stored = StoredParticipant {
            participant: RoomParticipant {
                hawk_id_hmac: "deadbeef".to_string(),
                display_name: "Alexis".to_string(),
                client_max_size: 4,
                user_mac: None,
            },
            expires_at: 1000,
        };

        let json: serde_json::Value = serde_json::to_value(&stored).unwrap();
        assert_eq!(json.get("hawkIdHmac").unwrap(), "deadbeef");
        assert_eq!(json.get("expiresAt").unwrap(), 1000);
        // Anonymous participants do not persist a null userMac.
        assert!(json.get("userMac").is_none());

        assert!(stored.is_active(999));
        assert!(!stored.is_active(1000));
        assert!(!stored.is_active(1001));
    }

    #[test]
    fn participant_round_trip() {
        let stored = StoredParticipant {
            participant: RoomParticipant {
                hawk_id_hmac: "deadbeef".to_string(),
                display_name: "Adam".to_string(),
                client_max_size: 2,
                user_mac: Some("abc123".to_string()),
            },
            expires_at: 1405546346,
        };
        let json = serde_json::to_string(&stored).unwrap();
        let parsed: StoredParticipant = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, stored);
    }

    #[test]
    fn push_entries_skip_missing_topics() {
        let urls = SimplePushUrls {
            calls: None,
            rooms: Some("https://push.example.com/abc".to_string()),
        };
        let entries: Vec<_> = urls.entries().collect();
        assert_eq!(
            entries,
            vec![(PushTopic::Rooms, "https://push.example.com/abc")]
        );
    }
}
