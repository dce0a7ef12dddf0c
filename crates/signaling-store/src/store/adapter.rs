//! The `Storage` adapter over the TTL key-value engine.
//!
//! Every entity read/write goes through here. Three rules hold for
//! every operation:
//!
//! - Mutations recompute the entity's TTL from its own `expiresAt`
//!   (or the fixed call duration) and re-apply it, so the store
//!   self-evicts and no TTL goes stale.
//! - Identifiers are validated before any command is issued; an empty
//!   segment would alias another key.
//! - "Not found" on a read is `Ok(None)`; only communication failures
//!   are errors, and they propagate unmodified.
//!
//! # Connection Pattern
//!
//! The redis-rs `MultiplexedConnection` is cheap to clone and designed
//! for concurrent use; each operation clones it rather than locking.

use crate::callstate::{CallState, CallStateEvent};
use crate::config::StoreConfig;
use crate::errors::{require, StoreError};
use crate::keys;
use crate::store::reconcile::reconcile_index;
use crate::store::scripts;
use crate::store::{now_secs, Transaction};
use crate::types::{
    CallRecord, CallUrl, CallUrlPatch, DeviceType, PushUrls, Room, RoomParticipant,
    SessionCredentials, SimplePushUrls, StoredParticipant,
};
use common::secret::ExposeSecret;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use std::collections::HashMap;
use tracing::{debug, error, instrument};

/// The TTL store adapter.
///
/// Cheaply cloneable: the connection multiplexes concurrent requests,
/// and the precompiled scripts are shared. Components receive a clone
/// at construction rather than reaching for process-wide state.
#[derive(Clone)]
pub struct Storage {
    /// Kept for potential reconnection scenarios.
    #[allow(dead_code)]
    client: Client,
    connection: MultiplexedConnection,
    config: StoreConfig,
    join_room_script: Script,
    advance_state_script: Script,
}

impl Storage {
    /// Connect to the key-value engine.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Redis`] if the URL is malformed or the
    /// engine is unreachable.
    pub async fn connect(config: StoreConfig) -> Result<Self, StoreError> {
        // Do not log the URL, it may carry credentials.
        let client = Client::open(config.redis_url.expose_secret()).map_err(|e| {
            error!(target: "store.redis", error = %e, "Failed to open Redis client");
            StoreError::Redis(format!("failed to open client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "store.redis", error = %e, "Failed to connect to Redis");
                StoreError::Redis(format!("failed to connect: {e}"))
            })?;

        Ok(Self {
            client,
            connection,
            config,
            join_room_script: Script::new(scripts::JOIN_ROOM),
            advance_state_script: Script::new(scripts::ADVANCE_CALL_STATE),
        })
    }

    /// The configuration this store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Write a heartbeat value, proving the engine is reachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let () = conn.set(keys::HEARTBEAT, now_secs()).await?;
        Ok(())
    }

    // Push subscriptions ---------------------------------------------------

    /// Register one client device's push endpoints.
    ///
    /// Each device keeps a topic→URL hash; the per-user device set
    /// indexes them.
    #[instrument(skip_all, fields(user_mac = %user_mac, device = %hawk_id_hmac))]
    pub async fn set_push_subscription(
        &self,
        user_mac: &str,
        hawk_id_hmac: &str,
        urls: &SimplePushUrls,
    ) -> Result<(), StoreError> {
        require(user_mac, "userMac")?;
        require(hawk_id_hmac, "hawkIdHmac")?;

        let pairs: Vec<(&str, &str)> = urls
            .entries()
            .map(|(topic, url)| (topic.as_str(), url))
            .collect();
        if pairs.is_empty() {
            return Err(StoreError::Validation(
                "at least one push topic URL is required".to_string(),
            ));
        }

        let mut conn = self.connection.clone();
        let () = conn
            .hset_multiple(keys::push_topic_urls(user_mac, hawk_id_hmac), &pairs)
            .await?;
        let () = conn
            .sadd(keys::push_devices(user_mac), hawk_id_hmac)
            .await?;
        Ok(())
    }

    /// All push endpoints registered for a user, deduplicated per
    /// topic across devices.
    pub async fn push_urls(&self, user_mac: &str) -> Result<PushUrls, StoreError> {
        require(user_mac, "userMac")?;
        let mut conn = self.connection.clone();

        let devices: Vec<String> = conn.smembers(keys::push_devices(user_mac)).await?;

        let mut out = PushUrls::default();
        for device in &devices {
            let mapping: HashMap<String, String> = conn
                .hgetall(keys::push_topic_urls(user_mac, device))
                .await?;
            if let Some(url) = mapping.get("calls") {
                if !out.calls.contains(url) {
                    out.calls.push(url.clone());
                }
            }
            if let Some(url) = mapping.get("rooms") {
                if !out.rooms.contains(url) {
                    out.rooms.push(url.clone());
                }
            }
        }
        Ok(out)
    }

    /// Remove one device's push registration. A no-op if the device
    /// was never registered.
    pub async fn remove_push_subscription(
        &self,
        user_mac: &str,
        hawk_id_hmac: &str,
    ) -> Result<(), StoreError> {
        require(user_mac, "userMac")?;
        require(hawk_id_hmac, "hawkIdHmac")?;
        let mut conn = self.connection.clone();

        let removed: i64 = conn
            .srem(keys::push_devices(user_mac), hawk_id_hmac)
            .await?;
        if removed > 0 {
            let () = conn
                .del(keys::push_topic_urls(user_mac, hawk_id_hmac))
                .await?;
        }
        Ok(())
    }

    /// Drop every push registration a user has (account teardown).
    pub async fn purge_push_subscriptions(&self, user_mac: &str) -> Result<(), StoreError> {
        require(user_mac, "userMac")?;
        let mut conn = self.connection.clone();

        let devices: Vec<String> = conn.smembers(keys::push_devices(user_mac)).await?;
        for device in &devices {
            let () = conn.del(keys::push_topic_urls(user_mac, device)).await?;
        }
        let () = conn.del(keys::push_devices(user_mac)).await?;
        Ok(())
    }

    // Call urls ------------------------------------------------------------

    /// Store a shareable call link. TTL is `expires - now`; the link
    /// is also added to the owner's index.
    pub async fn add_call_url(&self, url: &CallUrl) -> Result<(), StoreError> {
        require(&url.call_url_id, "callUrlId")?;
        require(&url.user_mac, "userMac")?;

        let ttl = url.expires_at - now_secs();
        if ttl <= 0 {
            return Err(StoreError::Validation(
                "call url expiry is in the past".to_string(),
            ));
        }

        let mut conn = self.connection.clone();
        let key = keys::call_url(&url.call_url_id);
        let () = conn
            .set_ex(&key, serde_json::to_string(url)?, ttl as u64)
            .await?;
        let () = conn
            .sadd(keys::user_call_urls(&url.user_mac), &key)
            .await?;
        Ok(())
    }

    /// Merge owner edits into a call url and re-stamp its TTL from
    /// the merged expiry. Reports [`StoreError::NotFound`] if the url
    /// is not in the owner's index or its entry has already expired.
    pub async fn update_call_url(
        &self,
        user_mac: &str,
        call_url_id: &str,
        patch: CallUrlPatch,
    ) -> Result<CallUrl, StoreError> {
        require(user_mac, "userMac")?;
        require(call_url_id, "callUrlId")?;
        let mut conn = self.connection.clone();

        let known: bool = conn
            .sismember(keys::user_call_urls(user_mac), keys::call_url(call_url_id))
            .await?;
        if !known {
            return Err(StoreError::NotFound("call url"));
        }

        let mut url = self
            .call_url(call_url_id)
            .await?
            .ok_or(StoreError::NotFound("call url"))?;
        url.apply(patch);

        let ttl = url.expires_at - now_secs();
        if ttl <= 0 {
            return Err(StoreError::Validation(
                "call url expiry is in the past".to_string(),
            ));
        }
        let () = conn
            .set_ex(
                keys::call_url(call_url_id),
                serde_json::to_string(&url)?,
                ttl as u64,
            )
            .await?;
        Ok(url)
    }

    /// Fetch a call url by token.
    pub async fn call_url(&self, call_url_id: &str) -> Result<Option<CallUrl>, StoreError> {
        require(call_url_id, "callUrlId")?;
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(keys::call_url(call_url_id)).await?;
        raw.map(|data| serde_json::from_str(&data).map_err(Into::into))
            .transpose()
    }

    /// A user's live call urls, oldest first. Expired entries are
    /// dropped from the index as a side effect.
    pub async fn user_call_urls(&self, user_mac: &str) -> Result<Vec<CallUrl>, StoreError> {
        require(user_mac, "userMac")?;
        let mut conn = self.connection.clone();
        reconcile_index(&mut conn, &keys::user_call_urls(user_mac), |url: &CallUrl| {
            url.timestamp
        })
        .await
    }

    /// Revoke a call url token immediately.
    pub async fn revoke_call_url(&self, call_url_id: &str) -> Result<(), StoreError> {
        require(call_url_id, "callUrlId")?;
        let mut conn = self.connection.clone();
        let () = conn.del(keys::call_url(call_url_id)).await?;
        Ok(())
    }

    /// Drop all of a user's call urls and the index itself.
    pub async fn delete_user_call_urls(&self, user_mac: &str) -> Result<(), StoreError> {
        require(user_mac, "userMac")?;
        let mut conn = self.connection.clone();

        let members: Vec<String> = conn.smembers(keys::user_call_urls(user_mac)).await?;
        if !members.is_empty() {
            let () = conn.del(members).await?;
        }
        let () = conn.del(keys::user_call_urls(user_mac)).await?;
        Ok(())
    }

    // Calls ----------------------------------------------------------------

    /// Store a call record with the fixed configured call duration and
    /// index it under the owner.
    pub async fn add_call(&self, record: &CallRecord) -> Result<(), StoreError> {
        require(&record.call_id, "callId")?;
        require(&record.user_mac, "userMac")?;

        let mut conn = self.connection.clone();
        let key = keys::call(&record.call_id);
        let () = conn
            .set_ex(
                &key,
                serde_json::to_string(record)?,
                self.config.call_duration_seconds,
            )
            .await?;
        let () = conn.sadd(keys::user_calls(&record.user_mac), &key).await?;
        Ok(())
    }

    /// Fetch a call record by id.
    pub async fn call(&self, call_id: &str) -> Result<Option<CallRecord>, StoreError> {
        require(call_id, "callId")?;
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(keys::call(call_id)).await?;
        raw.map(|data| serde_json::from_str(&data).map_err(Into::into))
            .transpose()
    }

    /// A user's live calls, oldest first, reconciling the index.
    pub async fn user_calls(&self, user_mac: &str) -> Result<Vec<CallRecord>, StoreError> {
        require(user_mac, "userMac")?;
        let mut conn = self.connection.clone();
        reconcile_index(&mut conn, &keys::user_calls(user_mac), |c: &CallRecord| {
            c.timestamp
        })
        .await
    }

    /// Delete a call record. Returns whether it still existed.
    pub async fn delete_call(&self, call_id: &str) -> Result<bool, StoreError> {
        require(call_id, "callId")?;
        let mut conn = self.connection.clone();
        let removed: i64 = conn.del(keys::call(call_id)).await?;
        Ok(removed != 0)
    }

    /// Drop all of a user's calls, their state hashes, and the index.
    pub async fn delete_user_calls(&self, user_mac: &str) -> Result<(), StoreError> {
        require(user_mac, "userMac")?;
        let mut conn = self.connection.clone();

        let members: Vec<String> = conn.smembers(keys::user_calls(user_mac)).await?;
        if !members.is_empty() {
            let values: Vec<Option<String>> = redis::cmd("MGET")
                .arg(&members)
                .query_async(&mut conn)
                .await?;

            let mut doomed = members.clone();
            for record in values.into_iter().flatten() {
                let call: CallRecord = serde_json::from_str(&record)?;
                doomed.push(keys::call_state(&call.call_id));
            }
            let () = conn.del(doomed).await?;
        }
        let () = conn.del(keys::user_calls(user_mac)).await?;
        Ok(())
    }

    /// Record why a call ended. The reason shares the call record's
    /// remaining TTL.
    pub async fn set_call_termination_reason(
        &self,
        call_id: &str,
        reason: &str,
    ) -> Result<(), StoreError> {
        require(call_id, "callId")?;
        let mut conn = self.connection.clone();

        let ttl: i64 = conn.ttl(keys::call(call_id)).await?;
        if ttl <= 0 {
            return Err(StoreError::NotFound("call"));
        }
        let () = conn
            .set_ex(keys::call_state_reason(call_id), reason, ttl as u64)
            .await?;
        Ok(())
    }

    /// The recorded termination reason, if any.
    pub async fn call_termination_reason(
        &self,
        call_id: &str,
    ) -> Result<Option<String>, StoreError> {
        require(call_id, "callId")?;
        let mut conn = self.connection.clone();
        let reason: Option<String> = conn.get(keys::call_state_reason(call_id)).await?;
        Ok(reason)
    }

    /// Bump the connected-device counter for one side of a call.
    pub async fn increment_connected_devices(
        &self,
        call_id: &str,
        device: DeviceType,
    ) -> Result<i64, StoreError> {
        require(call_id, "callId")?;
        let mut conn = self.connection.clone();
        let key = keys::call_devices(call_id, device);
        let count: i64 = conn.incr(&key, 1).await?;
        let () = conn
            .expire(&key, self.config.call_duration_seconds as i64)
            .await?;
        Ok(count)
    }

    /// Decrement the connected-device counter for one side of a call.
    pub async fn decrement_connected_devices(
        &self,
        call_id: &str,
        device: DeviceType,
    ) -> Result<i64, StoreError> {
        require(call_id, "callId")?;
        let mut conn = self.connection.clone();
        let key = keys::call_devices(call_id, device);
        let count: i64 = conn.decr(&key, 1).await?;
        let () = conn
            .expire(&key, self.config.call_duration_seconds as i64)
            .await?;
        Ok(count)
    }

    /// The connected-device count for one side of a call.
    pub async fn connected_devices(
        &self,
        call_id: &str,
        device: DeviceType,
    ) -> Result<Option<i64>, StoreError> {
        require(call_id, "callId")?;
        let mut conn = self.connection.clone();
        let count: Option<i64> = conn.get(keys::call_devices(call_id, device)).await?;
        Ok(count)
    }

    // Call state -----------------------------------------------------------

    /// Apply a state-machine event to a call.
    ///
    /// Runs server-side so the duplicate check and the write are one
    /// atomic step. With no explicit TTL the state hash inherits the
    /// call record's remaining TTL, keeping both in lockstep; once
    /// the record has expired the advance fails with
    /// [`StoreError::NotFound`] and drops any leftover state hash.
    /// `Terminate` deletes the state hash outright.
    #[instrument(skip_all, fields(call_id = %call_id, event = %event))]
    pub async fn advance_call_state(
        &self,
        call_id: &str,
        event: CallStateEvent,
        ttl_seconds: Option<u64>,
    ) -> Result<CallState, StoreError> {
        require(call_id, "callId")?;
        let mut conn = self.connection.clone();
        let state_key = keys::call_state(call_id);

        if event == CallStateEvent::Terminate {
            let () = conn.del(&state_key).await?;
            debug!(target: "store.callstate", call_id = %call_id, "Call terminated, state dropped");
            return Ok(CallState::Terminated);
        }

        let ttl_ms: i64 = match ttl_seconds {
            Some(seconds) => (seconds as i64) * 1000,
            None => {
                // Inherit whatever the record has left. A state hash
                // written without the record would never expire and
                // would shadow the record-presence check, so the
                // advance is refused and any leftover hash dropped.
                let remaining: i64 = conn.pttl(keys::call(call_id)).await?;
                if remaining <= 0 {
                    let () = conn.del(&state_key).await?;
                    return Err(StoreError::NotFound("call"));
                }
                remaining
            }
        };

        let mut invocation = self.advance_state_script.key(&state_key);
        invocation.arg(event.hash_field()).arg(ttl_ms);
        for state in CallState::PROGRESSION {
            invocation.arg(state.as_str());
        }
        let name: String = invocation.invoke_async(&mut conn).await?;

        CallState::from_name(&name)
            .ok_or_else(|| StoreError::Serialization(format!("unknown call state: {name}")))
    }

    /// The call's current lifecycle stage.
    ///
    /// An absent state hash is disambiguated via the call record:
    /// record present means the call was terminated, both absent means
    /// the call is unknown.
    pub async fn call_state(&self, call_id: &str) -> Result<Option<CallState>, StoreError> {
        require(call_id, "callId")?;
        let mut conn = self.connection.clone();

        let name: Option<String> = conn.hget(keys::call_state(call_id), "state").await?;
        if let Some(name) = name {
            return CallState::from_name(&name)
                .map(Some)
                .ok_or_else(|| StoreError::Serialization(format!("unknown call state: {name}")));
        }

        let record_exists: bool = conn.exists(keys::call(call_id)).await?;
        Ok(record_exists.then_some(CallState::Terminated))
    }

    /// Remaining lifetime of the call state in whole seconds, `-1`
    /// once expired or absent.
    pub async fn call_state_ttl(&self, call_id: &str) -> Result<i64, StoreError> {
        require(call_id, "callId")?;
        let mut conn = self.connection.clone();
        let ttl_ms: i64 = conn.pttl(keys::call_state(call_id)).await?;
        if ttl_ms <= 1 {
            return Ok(-1);
        }
        Ok(ttl_ms / 1000)
    }

    // Sessions -------------------------------------------------------------

    /// Store a session's auth key under the configured session
    /// duration.
    pub async fn set_session_key(
        &self,
        hawk_id_hmac: &str,
        auth_key: &str,
    ) -> Result<(), StoreError> {
        require(hawk_id_hmac, "hawkIdHmac")?;
        require(auth_key, "authKey")?;
        let mut conn = self.connection.clone();
        let () = conn
            .set_ex(
                keys::hawk_session(hawk_id_hmac),
                auth_key,
                self.config.hawk_session_duration_seconds,
            )
            .await?;
        Ok(())
    }

    /// The session credentials for a session id, if still live.
    pub async fn session_credentials(
        &self,
        hawk_id_hmac: &str,
    ) -> Result<Option<SessionCredentials>, StoreError> {
        require(hawk_id_hmac, "hawkIdHmac")?;
        let mut conn = self.connection.clone();
        let key: Option<String> = conn.get(keys::hawk_session(hawk_id_hmac)).await?;
        Ok(key.map(SessionCredentials::sha256))
    }

    /// Push both session association keys' expiries forward by the
    /// configured session duration.
    pub async fn touch_session(&self, hawk_id_hmac: &str) -> Result<(), StoreError> {
        require(hawk_id_hmac, "hawkIdHmac")?;
        let mut conn = self.connection.clone();
        let duration = self.config.hawk_session_duration_seconds as i64;
        let () = conn.expire(keys::user_id(hawk_id_hmac), duration).await?;
        let () = conn
            .expire(keys::hawk_session(hawk_id_hmac), duration)
            .await?;
        Ok(())
    }

    /// Delete a session's auth key.
    pub async fn delete_session(&self, hawk_id_hmac: &str) -> Result<(), StoreError> {
        require(hawk_id_hmac, "hawkIdHmac")?;
        let mut conn = self.connection.clone();
        let () = conn.del(keys::hawk_session(hawk_id_hmac)).await?;
        Ok(())
    }

    /// Associate an encrypted user identifier with a session.
    pub async fn set_user_id(
        &self,
        hawk_id_hmac: &str,
        encrypted_user_id: &str,
    ) -> Result<(), StoreError> {
        require(hawk_id_hmac, "hawkIdHmac")?;
        require(encrypted_user_id, "encryptedUserId")?;
        let mut conn = self.connection.clone();
        let () = conn
            .set_ex(
                keys::user_id(hawk_id_hmac),
                encrypted_user_id,
                self.config.hawk_session_duration_seconds,
            )
            .await?;
        Ok(())
    }

    /// The encrypted user identifier for a session.
    pub async fn user_id(&self, hawk_id_hmac: &str) -> Result<Option<String>, StoreError> {
        require(hawk_id_hmac, "hawkIdHmac")?;
        let mut conn = self.connection.clone();
        let id: Option<String> = conn.get(keys::user_id(hawk_id_hmac)).await?;
        Ok(id)
    }

    /// Remove the encrypted user identifier for a session.
    pub async fn delete_user_id(&self, hawk_id_hmac: &str) -> Result<(), StoreError> {
        require(hawk_id_hmac, "hawkIdHmac")?;
        let mut conn = self.connection.clone();
        let () = conn.del(keys::user_id(hawk_id_hmac)).await?;
        Ok(())
    }

    /// Store the OAuth token for a session. Unlike the session keys
    /// this does not expire on its own; it is dropped with the user.
    pub async fn set_oauth_token(&self, hawk_id_hmac: &str, token: &str) -> Result<(), StoreError> {
        require(hawk_id_hmac, "hawkIdHmac")?;
        let mut conn = self.connection.clone();
        let () = conn.set(keys::oauth_token(hawk_id_hmac), token).await?;
        Ok(())
    }

    /// The OAuth token for a session.
    pub async fn oauth_token(&self, hawk_id_hmac: &str) -> Result<Option<String>, StoreError> {
        require(hawk_id_hmac, "hawkIdHmac")?;
        let mut conn = self.connection.clone();
        let token: Option<String> = conn.get(keys::oauth_token(hawk_id_hmac)).await?;
        Ok(token)
    }

    /// Store the in-flight OAuth state for a session.
    pub async fn set_oauth_state(&self, hawk_id_hmac: &str, state: &str) -> Result<(), StoreError> {
        require(hawk_id_hmac, "hawkIdHmac")?;
        let mut conn = self.connection.clone();
        let () = conn
            .set_ex(
                keys::oauth_state(hawk_id_hmac),
                state,
                self.config.hawk_session_duration_seconds,
            )
            .await?;
        Ok(())
    }

    /// The in-flight OAuth state for a session.
    pub async fn oauth_state(&self, hawk_id_hmac: &str) -> Result<Option<String>, StoreError> {
        require(hawk_id_hmac, "hawkIdHmac")?;
        let mut conn = self.connection.clone();
        let state: Option<String> = conn.get(keys::oauth_state(hawk_id_hmac)).await?;
        Ok(state)
    }

    /// Clear the in-flight OAuth state for a session.
    pub async fn clear_oauth_state(&self, hawk_id_hmac: &str) -> Result<(), StoreError> {
        require(hawk_id_hmac, "hawkIdHmac")?;
        let mut conn = self.connection.clone();
        let () = conn.del(keys::oauth_state(hawk_id_hmac)).await?;
        Ok(())
    }

    // Rooms ----------------------------------------------------------------

    /// Store a room with TTL `expiresAt - updateTime` and index it
    /// under its owner.
    pub async fn set_room(&self, room: &Room) -> Result<(), StoreError> {
        require(&room.room_token, "roomToken")?;
        require(&room.room_owner_hmac, "roomOwnerHmac")?;

        let ttl = room.expires_at - room.update_time;
        if ttl <= 0 {
            return Err(StoreError::Validation(
                "room expiry is not after its update time".to_string(),
            ));
        }

        let mut conn = self.connection.clone();
        let key = keys::room(&room.room_token);
        let () = conn
            .set_ex(&key, serde_json::to_string(room)?, ttl as u64)
            .await?;
        let () = conn
            .sadd(keys::user_rooms(&room.room_owner_hmac), &key)
            .await?;
        Ok(())
    }

    /// Fetch a room by token.
    pub async fn room(&self, room_token: &str) -> Result<Option<Room>, StoreError> {
        require(room_token, "roomToken")?;
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(keys::room(room_token)).await?;
        raw.map(|data| serde_json::from_str(&data).map_err(Into::into))
            .transpose()
    }

    /// A user's live rooms ordered by update time, reconciling the
    /// index.
    pub async fn user_rooms(&self, user_mac: &str) -> Result<Vec<Room>, StoreError> {
        require(user_mac, "userMac")?;
        let mut conn = self.connection.clone();
        reconcile_index(&mut conn, &keys::user_rooms(user_mac), |room: &Room| {
            room.update_time
        })
        .await
    }

    /// Bump a room's `updateTime` to now and re-derive its TTL; the
    /// new `updateTime` is the version the fan-out delivers.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the room is gone or its expiry has
    /// already passed.
    #[instrument(skip_all, fields(room_token = %room_token))]
    pub async fn touch_room(&self, room_token: &str) -> Result<Room, StoreError> {
        let mut room = self
            .room(room_token)
            .await?
            .ok_or(StoreError::NotFound("room"))?;

        room.update_time = now_secs();
        let ttl = room.expires_at - room.update_time;
        if ttl <= 0 {
            return Err(StoreError::NotFound("room"));
        }

        let mut conn = self.connection.clone();
        let () = conn
            .set_ex(
                keys::room(&room.room_token),
                serde_json::to_string(&room)?,
                ttl as u64,
            )
            .await?;
        Ok(room)
    }

    /// Delete a room, its participants, and leave a deleted-room
    /// marker so syncing clients can observe the deletion for a grace
    /// period. The first deletion timestamp wins if the marker
    /// already exists.
    #[instrument(skip_all, fields(room_token = %room_token))]
    pub async fn delete_room(&self, room_token: &str) -> Result<Room, StoreError> {
        let room = self
            .room(room_token)
            .await?
            .ok_or(StoreError::NotFound("room"))?;

        let mut conn = self.connection.clone();
        let () = conn.del(keys::room(room_token)).await?;
        let () = conn.del(keys::room_participants(room_token)).await?;

        let marker_key = keys::deleted_rooms(&room.room_owner_hmac);
        let _: bool = conn.hset_nx(&marker_key, room_token, now_secs()).await?;
        let () = conn
            .expire(&marker_key, self.config.rooms_deleted_ttl_seconds as i64)
            .await?;

        debug!(target: "store.rooms", room_token = %room_token, "Room deleted");
        Ok(room)
    }

    /// Room tokens an owner deleted at or after `since` (defaulting
    /// to the whole retention window). Entries older than the
    /// retention window are dropped from the marker hash lazily.
    pub async fn deleted_rooms(
        &self,
        owner_mac: &str,
        since: Option<i64>,
    ) -> Result<Vec<String>, StoreError> {
        require(owner_mac, "ownerMac")?;
        let mut conn = self.connection.clone();

        let cutoff = now_secs() - self.config.rooms_deleted_ttl_seconds as i64;
        let since = since.unwrap_or(cutoff);

        let mapping: HashMap<String, i64> = conn.hgetall(keys::deleted_rooms(owner_mac)).await?;

        let mut deleted = Vec::new();
        let mut aged: Vec<String> = Vec::new();
        for (token, deleted_at) in &mapping {
            if *deleted_at >= since {
                deleted.push(token.clone());
            }
            if *deleted_at < cutoff {
                aged.push(token.clone());
            }
        }

        if !aged.is_empty() {
            let () = conn.hdel(keys::deleted_rooms(owner_mac), aged).await?;
        }
        Ok(deleted)
    }

    // Room participants ----------------------------------------------------

    /// Atomically admit a participant against the room's capacity.
    ///
    /// The admission check, the lazy pruning of lapsed entries, the
    /// participant write, and the companion access token all happen in
    /// one server-side step, so two concurrent joiners cannot both
    /// slip past a capacity boundary.
    ///
    /// Returns the active participant count after the join.
    ///
    /// # Errors
    ///
    /// [`StoreError::RoomFull`] when the effective capacity is already
    /// reached; [`StoreError::ClientCapacityTooLow`] when the joiner
    /// itself cannot support the current population.
    #[instrument(skip_all, fields(room_token = %room_token, hawk_id_hmac = %participant.hawk_id_hmac))]
    pub async fn add_room_participant(
        &self,
        room_token: &str,
        max_size: u32,
        participant: &RoomParticipant,
        ttl_seconds: u64,
    ) -> Result<u32, StoreError> {
        require(room_token, "roomToken")?;
        require(&participant.hawk_id_hmac, "hawkIdHmac")?;

        let now = now_secs();
        let stored = StoredParticipant {
            participant: participant.clone(),
            expires_at: now + ttl_seconds as i64,
        };

        let mut conn = self.connection.clone();
        let reply: Vec<i64> = self
            .join_room_script
            .key(keys::room_participants(room_token))
            .key(keys::room_access_token(
                room_token,
                &participant.hawk_id_hmac,
            ))
            .arg(now)
            .arg(max_size)
            .arg(&participant.hawk_id_hmac)
            .arg(participant.client_max_size)
            .arg(serde_json::to_string(&stored)?)
            .arg(ttl_seconds * 1000)
            .invoke_async(&mut conn)
            .await?;

        let code = reply.first().copied().unwrap_or(0);
        let detail = reply.get(1).copied().unwrap_or(0);
        match code {
            1 => {
                debug!(
                    target: "store.rooms",
                    room_token = %room_token,
                    active_count = detail,
                    "Participant admitted"
                );
                Ok(detail as u32)
            }
            -1 => Err(StoreError::RoomFull {
                effective_capacity: detail as u32,
            }),
            -2 => Err(StoreError::ClientCapacityTooLow {
                client_max_size: participant.client_max_size,
                active_count: detail as u32,
            }),
            other => Err(StoreError::Redis(format!(
                "unexpected admission reply: {other}"
            ))),
        }
    }

    /// Extend a participant's expiry and its companion access token
    /// together.
    ///
    /// Returns `Ok(false)` — a normal outcome, not an error — once the
    /// participant's expiry has already lapsed; the caller must
    /// re-join.
    #[instrument(skip_all, fields(room_token = %room_token, hawk_id_hmac = %hawk_id_hmac))]
    pub async fn touch_room_participant(
        &self,
        room_token: &str,
        hawk_id_hmac: &str,
        ttl_seconds: u64,
    ) -> Result<bool, StoreError> {
        require(room_token, "roomToken")?;
        require(hawk_id_hmac, "hawkIdHmac")?;
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn
            .hget(keys::room_participants(room_token), hawk_id_hmac)
            .await?;
        let Some(raw) = raw else {
            return Ok(false);
        };

        let mut stored: StoredParticipant = serde_json::from_str(&raw)?;
        let now = now_secs();
        if !stored.is_active(now) {
            return Ok(false);
        }
        stored.expires_at = now + ttl_seconds as i64;

        let mut tx = Transaction::new();
        tx.hset(
            &keys::room_participants(room_token),
            hawk_id_hmac,
            &serde_json::to_string(&stored)?,
        )
        .pexpire(
            &keys::room_access_token(room_token, hawk_id_hmac),
            (ttl_seconds * 1000) as i64,
        );
        tx.commit(&mut conn).await?;
        Ok(true)
    }

    /// Remove a participant and its companion access token together.
    /// Removing an absent participant is a no-op.
    pub async fn remove_room_participant(
        &self,
        room_token: &str,
        hawk_id_hmac: &str,
    ) -> Result<(), StoreError> {
        require(room_token, "roomToken")?;
        require(hawk_id_hmac, "hawkIdHmac")?;
        let mut conn = self.connection.clone();

        let mut tx = Transaction::new();
        tx.hdel(&keys::room_participants(room_token), hawk_id_hmac)
            .del(&keys::room_access_token(room_token, hawk_id_hmac));
        tx.commit(&mut conn).await?;
        Ok(())
    }

    /// The active participants of a room, expiry metadata stripped.
    /// Lapsed entries are pruned from the hash as a side effect.
    pub async fn room_participants(
        &self,
        room_token: &str,
    ) -> Result<Vec<RoomParticipant>, StoreError> {
        require(room_token, "roomToken")?;
        let mut conn = self.connection.clone();

        let mapping: HashMap<String, String> =
            conn.hgetall(keys::room_participants(room_token)).await?;
        if mapping.is_empty() {
            return Ok(Vec::new());
        }

        let now = now_secs();
        let mut active = Vec::new();
        let mut lapsed: Vec<String> = Vec::new();
        for (field, raw) in &mapping {
            let stored: StoredParticipant = serde_json::from_str(raw)?;
            if stored.is_active(now) {
                active.push(stored.participant);
            } else {
                lapsed.push(field.clone());
            }
        }

        if !lapsed.is_empty() {
            let () = conn
                .hdel(keys::room_participants(room_token), lapsed)
                .await?;
        }
        Ok(active)
    }

    /// Drop a room's whole participant hash.
    pub async fn delete_room_participants(&self, room_token: &str) -> Result<(), StoreError> {
        require(room_token, "roomToken")?;
        let mut conn = self.connection.clone();
        let () = conn.del(keys::room_participants(room_token)).await?;
        Ok(())
    }

    /// Issue a companion access token proving an anonymous
    /// participant's session is still valid.
    pub async fn set_room_access_token(
        &self,
        room_token: &str,
        hawk_id_hmac: &str,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        require(room_token, "roomToken")?;
        require(hawk_id_hmac, "hawkIdHmac")?;
        let mut conn = self.connection.clone();
        let () = conn
            .pset_ex(
                keys::room_access_token(room_token, hawk_id_hmac),
                "",
                ttl_seconds * 1000,
            )
            .await?;
        Ok(())
    }

    /// Whether a participant's companion access token is still live.
    /// Expiry here is a normal outcome (`Ok(false)`), not a failure.
    pub async fn is_room_access_token_valid(
        &self,
        room_token: &str,
        hawk_id_hmac: &str,
    ) -> Result<bool, StoreError> {
        require(room_token, "roomToken")?;
        require(hawk_id_hmac, "hawkIdHmac")?;
        let mut conn = self.connection.clone();
        let value: Option<String> = conn
            .get(keys::room_access_token(room_token, hawk_id_hmac))
            .await?;
        Ok(matches!(value, Some(ref marker) if marker.is_empty()))
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
