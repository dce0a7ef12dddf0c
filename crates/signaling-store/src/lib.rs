//! Ephemeral signaling store for a real-time call and room service.
//!
//! Everything here is transient coordination state: call records and
//! their lifecycle stage, shareable call links, room metadata and
//! occupancy, session associations, and push registrations. Every
//! entity carries a TTL derived from its own expiry semantics, so the
//! store converges toward empty on its own; nothing is durable and
//! nothing needs a background sweeper.
//!
//! Layering, bottom up:
//!
//! - [`store`]: the TTL store adapter over Redis. Key scheme in
//!   [`keys`], atomic admission and state advancement as server-side
//!   scripts, lazy index reconciliation, multi-key transactions.
//! - [`callstate`]: the call lifecycle state machine.
//! - [`calls`], [`rooms`]: the operations clients drive, including
//!   capacity negotiation and the push fan-out ([`fanout`]).
//!
//! Capacity rejections and lapsed-presence refreshes are typed
//! outcomes, not generic errors; see [`errors`] for the taxonomy.

pub mod calls;
pub mod callstate;
pub mod config;
pub mod errors;
pub mod fanout;
pub mod keys;
pub mod rooms;
pub mod store;
pub mod types;

pub use calls::{CallService, CallWithState, CreateCallRequest};
pub use callstate::{CallState, CallStateEvent};
pub use config::{ConfigError, StoreConfig};
pub use errors::StoreError;
pub use fanout::PushNotifier;
pub use rooms::{
    effective_capacity, CreateRoomRequest, RoomInfo, RoomService, UpdateRoomRequest,
};
pub use store::{Storage, Transaction};
pub use types::{
    CallRecord, CallUrl, CallUrlPatch, DeviceType, PushTopic, PushUrls, Room, RoomParticipant,
    SessionCredentials, SimplePushUrls, StoredParticipant,
};
