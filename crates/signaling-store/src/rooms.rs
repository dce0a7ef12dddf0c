//! Room lifecycle and capacity negotiation.
//!
//! A room has two caps: the owner-configured `maxSize`, and each
//! active participant's self-declared `clientMaxSize`. The binding
//! limit at any moment is the smaller of `maxSize` and the smallest
//! active `clientMaxSize`; an empty room is bounded by `maxSize`
//! alone. Admission is checked server-side in one atomic step (see
//! the store adapter), so the capacity rule holds under concurrent
//! joins.
//!
//! Every mutation that changes what other clients should see (create,
//! update, delete, join, leave) bumps the room's `updateTime` and
//! fans that value out as the push version. Refreshing one's own
//! presence does not.

use crate::config::StoreConfig;
use crate::errors::StoreError;
use crate::fanout::PushNotifier;
use crate::store::{now_secs, Storage};
use crate::types::{Room, RoomParticipant};
use common::tokens::generate_token;
use tracing::instrument;

/// The binding participant limit for a room.
///
/// `min(max_size, min over active clientMaxSize)`; with no active
/// participants the owner's cap stands alone.
#[must_use]
pub fn effective_capacity(max_size: u32, client_caps: impl IntoIterator<Item = u32>) -> u32 {
    client_caps.into_iter().fold(max_size, u32::min)
}

/// Validated request to create a room.
#[derive(Debug, Clone)]
pub struct CreateRoomRequest {
    /// Owning user (HMAC identity).
    pub room_owner_hmac: String,
    /// Owner-assigned display name.
    pub room_name: String,
    /// Owner-configured participant cap.
    pub max_size: u32,
    /// Media session identifier for the room.
    pub session_id: String,
    /// Media API key for the session.
    pub api_key: String,
    /// Room lifetime from now, in seconds.
    pub expires_in_seconds: u64,
}

/// Validated request to update a room; absent fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct UpdateRoomRequest {
    pub room_name: Option<String>,
    pub max_size: Option<u32>,
    /// New lifetime measured from the update, in seconds.
    pub expires_in_seconds: Option<u64>,
}

/// A room together with its live occupancy.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room: Room,
    pub participants: Vec<RoomParticipant>,
    /// The binding cap right now.
    pub effective_capacity: u32,
    pub active_count: u32,
}

/// Room operations: lifecycle, membership, and the owner-facing
/// push fan-out.
#[derive(Clone)]
pub struct RoomService {
    storage: Storage,
    notifier: PushNotifier,
}

impl RoomService {
    #[must_use]
    pub fn new(storage: Storage, notifier: PushNotifier) -> Self {
        Self { storage, notifier }
    }

    /// Mint a token, persist the room, and wake the owner's devices.
    #[instrument(skip_all, fields(room_owner = %request.room_owner_hmac))]
    pub async fn create_room(&self, request: CreateRoomRequest) -> Result<Room, StoreError> {
        if request.max_size == 0 {
            return Err(StoreError::Validation(
                "maxSize must be at least 1".to_string(),
            ));
        }
        if request.expires_in_seconds == 0 {
            return Err(StoreError::Validation(
                "expiresIn must be at least 1 second".to_string(),
            ));
        }

        let token = generate_token(self.config().room_token_size)
            .map_err(|e| StoreError::Internal(format!("room token generation failed: {e}")))?;

        let now = now_secs();
        let room = Room {
            room_token: token,
            room_owner_hmac: request.room_owner_hmac,
            room_name: request.room_name,
            max_size: request.max_size,
            session_id: request.session_id,
            api_key: request.api_key,
            creation_time: now,
            update_time: now,
            expires_at: now + request.expires_in_seconds as i64,
        };
        self.storage.set_room(&room).await?;

        self.notify_owner(&room.room_owner_hmac, room.update_time)
            .await?;
        Ok(room)
    }

    /// The room plus who is in it and what cap currently binds.
    pub async fn room_info(&self, room_token: &str) -> Result<Option<RoomInfo>, StoreError> {
        let Some(room) = self.storage.room(room_token).await? else {
            return Ok(None);
        };
        let participants = self.storage.room_participants(room_token).await?;

        let effective = effective_capacity(
            room.max_size,
            participants.iter().map(|p| p.client_max_size),
        );
        let active_count = participants.len() as u32;
        Ok(Some(RoomInfo {
            room,
            participants,
            effective_capacity: effective,
            active_count,
        }))
    }

    /// Apply owner edits, re-stamp `updateTime`, and wake the owner's
    /// devices.
    #[instrument(skip_all, fields(room_token = %room_token))]
    pub async fn update_room(
        &self,
        room_token: &str,
        request: UpdateRoomRequest,
    ) -> Result<Room, StoreError> {
        if request.max_size == Some(0) {
            return Err(StoreError::Validation(
                "maxSize must be at least 1".to_string(),
            ));
        }

        let mut room = self
            .storage
            .room(room_token)
            .await?
            .ok_or(StoreError::NotFound("room"))?;

        if let Some(name) = request.room_name {
            room.room_name = name;
        }
        if let Some(max_size) = request.max_size {
            room.max_size = max_size;
        }
        room.update_time = now_secs();
        if let Some(expires_in) = request.expires_in_seconds {
            room.expires_at = room.update_time + expires_in as i64;
        }
        self.storage.set_room(&room).await?;

        self.notify_owner(&room.room_owner_hmac, room.update_time)
            .await?;
        Ok(room)
    }

    /// Delete the room and wake the owner's devices one last time.
    #[instrument(skip_all, fields(room_token = %room_token))]
    pub async fn delete_room(&self, room_token: &str) -> Result<Room, StoreError> {
        let room = self.storage.delete_room(room_token).await?;
        self.notify_owner(&room.room_owner_hmac, now_secs()).await?;
        Ok(room)
    }

    /// Admit a participant, bump the room version, and wake the
    /// owner's devices.
    ///
    /// Capacity rejections ([`StoreError::RoomFull`],
    /// [`StoreError::ClientCapacityTooLow`]) surface unchanged from
    /// the atomic admission step.
    #[instrument(skip_all, fields(room_token = %room_token, hawk_id_hmac = %participant.hawk_id_hmac))]
    pub async fn join(
        &self,
        room_token: &str,
        participant: RoomParticipant,
    ) -> Result<Room, StoreError> {
        let room = self
            .storage
            .room(room_token)
            .await?
            .ok_or(StoreError::NotFound("room"))?;

        self.storage
            .add_room_participant(
                room_token,
                room.max_size,
                &participant,
                self.config().room_participant_ttl_seconds,
            )
            .await?;

        let room = self.storage.touch_room(room_token).await?;
        self.notify_owner(&room.room_owner_hmac, room.update_time)
            .await?;
        Ok(room)
    }

    /// Extend a participant's presence window. Returns `Ok(false)`
    /// once the window has lapsed; the client must re-join. No
    /// fan-out: nothing other clients can see changed.
    pub async fn refresh(&self, room_token: &str, hawk_id_hmac: &str) -> Result<bool, StoreError> {
        self.storage
            .touch_room_participant(
                room_token,
                hawk_id_hmac,
                self.config().room_participant_ttl_seconds,
            )
            .await
    }

    /// Remove a participant, bump the room version, and wake the
    /// owner's devices. Leaving an already-deleted room is a no-op.
    #[instrument(skip_all, fields(room_token = %room_token, hawk_id_hmac = %hawk_id_hmac))]
    pub async fn leave(&self, room_token: &str, hawk_id_hmac: &str) -> Result<(), StoreError> {
        self.storage
            .remove_room_participant(room_token, hawk_id_hmac)
            .await?;

        match self.storage.touch_room(room_token).await {
            Ok(room) => {
                self.notify_owner(&room.room_owner_hmac, room.update_time)
                    .await?;
                Ok(())
            }
            // The room may have expired or been deleted underneath us.
            Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// The room's active participants.
    pub async fn participants(
        &self,
        room_token: &str,
    ) -> Result<Vec<RoomParticipant>, StoreError> {
        self.storage.room_participants(room_token).await
    }

    async fn notify_owner(&self, owner_mac: &str, version: i64) -> Result<(), StoreError> {
        let urls = self.storage.push_urls(owner_mac).await?;
        self.notifier.notify(&urls.rooms, version);
        Ok(())
    }

    fn config(&self) -> &StoreConfig {
        self.storage.config()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_room_is_bounded_by_max_size() {
        assert_eq!(effective_capacity(5, []), 5);
    }

    #[test]
    fn weakest_client_binds() {
        // Room cap 5, clients declaring 4, 4, 2: the 2 binds.
        assert_eq!(effective_capacity(5, [4, 4, 2]), 2);
        assert_eq!(effective_capacity(4, [4, 4, 2]), 2);
    }

    #[test]
    fn owner_cap_binds_when_clients_are_generous() {
        assert_eq!(effective_capacity(3, [10, 10]), 3);
    }

    #[test]
    fn admission_boundary_walkthrough() {
        // maxSize 5. One client with cap 4 is in: effective 4.
        let caps = vec![4u32];
        assert_eq!(effective_capacity(5, caps.iter().copied()), 4);

        // A second cap-4 client joins: two active, effective still 4.
        let caps = vec![4u32, 4];
        assert_eq!(effective_capacity(5, caps.iter().copied()), 4);

        // A cap-2 client is rejected at this point: its own cap (2)
        // does not exceed the active count (2).
        let joiner_cap = 2u32;
        assert!(joiner_cap <= caps.len() as u32);

        // Had it been admitted, it would have shrunk the room to 2.
        assert_eq!(effective_capacity(5, [4, 4, 2]), 2);
    }

    #[test]
    fn full_room_rejects_at_effective_capacity() {
        // Effective capacity 2 with 2 active: the next join fails the
        // `effective <= active` check.
        let effective = effective_capacity(5, [2, 4]);
        assert_eq!(effective, 2);
        assert!(effective <= 2);
    }
}
