//! The call state machine.
//!
//! A two-party call progresses forward-only through a fixed ordinal
//! sequence. Each side contributes events as it sets up; every *new*
//! event advances the call exactly one stage, reapplying an event
//! changes nothing, and the order the sides interleave in does not
//! matter — only how many distinct events have been seen.
//!
//! The persisted form is a hash under `callstate.<callId>`: the
//! current state name under `state`, plus one field per applied event
//! for deduplication. Termination deletes the hash outright while the
//! call record lives on, so "record present, state hash absent" reads
//! as [`CallState::Terminated`]; when the record is gone too, the
//! state is unknown (`None`).

use crate::errors::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Call lifecycle stage, ordinal and forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CallState {
    #[serde(rename = "init")]
    Init,
    #[serde(rename = "half-initiated")]
    HalfInitiated,
    #[serde(rename = "alerting")]
    Alerting,
    #[serde(rename = "connecting")]
    Connecting,
    #[serde(rename = "half-connected")]
    HalfConnected,
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "terminated")]
    Terminated,
}

impl CallState {
    /// The non-terminal progression, in ordinal order. Feeds the
    /// advancement script and the distinct-event mapping.
    pub const PROGRESSION: [CallState; 6] = [
        CallState::Init,
        CallState::HalfInitiated,
        CallState::Alerting,
        CallState::Connecting,
        CallState::HalfConnected,
        CallState::Connected,
    ];

    /// Wire spelling, as stored and as reported to clients.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CallState::Init => "init",
            CallState::HalfInitiated => "half-initiated",
            CallState::Alerting => "alerting",
            CallState::Connecting => "connecting",
            CallState::HalfConnected => "half-connected",
            CallState::Connected => "connected",
            CallState::Terminated => "terminated",
        }
    }

    /// Parse a wire spelling.
    #[must_use]
    pub fn from_name(name: &str) -> Option<CallState> {
        match name {
            "init" => Some(CallState::Init),
            "half-initiated" => Some(CallState::HalfInitiated),
            "alerting" => Some(CallState::Alerting),
            "connecting" => Some(CallState::Connecting),
            "half-connected" => Some(CallState::HalfConnected),
            "connected" => Some(CallState::Connected),
            "terminated" => Some(CallState::Terminated),
            _ => None,
        }
    }

    /// The stage reached after one more distinct setup event.
    /// Saturates at [`CallState::Connected`]; termination is an
    /// explicit event, never a successor.
    #[must_use]
    pub fn successor(self) -> CallState {
        match self {
            CallState::Init => CallState::HalfInitiated,
            CallState::HalfInitiated => CallState::Alerting,
            CallState::Alerting => CallState::Connecting,
            CallState::Connecting => CallState::HalfConnected,
            CallState::HalfConnected | CallState::Connected => CallState::Connected,
            CallState::Terminated => CallState::Terminated,
        }
    }

    /// The stage implied by `n` distinct applied setup events.
    /// Outside `1..=6` there is no derivable stage; the caller must
    /// disambiguate via the call record.
    #[must_use]
    pub fn from_distinct_events(n: usize) -> Option<CallState> {
        n.checked_sub(1)
            .and_then(|i| Self::PROGRESSION.get(i))
            .copied()
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state-machine event, one per side and setup step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStateEvent {
    /// Call record created.
    Init,
    /// Caller acknowledged the call setup.
    InitCaller,
    /// Callee acknowledged the call setup (alerting).
    InitCallee,
    /// Callee accepted; media negotiation starts.
    Connecting,
    /// Caller's media is up.
    ConnectedCaller,
    /// Callee's media is up.
    ConnectedCallee,
    /// Either side hung up.
    Terminate,
}

impl CallStateEvent {
    /// All recognized events.
    pub const ALL: [CallStateEvent; 7] = [
        CallStateEvent::Init,
        CallStateEvent::InitCaller,
        CallStateEvent::InitCallee,
        CallStateEvent::Connecting,
        CallStateEvent::ConnectedCaller,
        CallStateEvent::ConnectedCallee,
        CallStateEvent::Terminate,
    ];

    /// Wire spelling of the event token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CallStateEvent::Init => "init",
            CallStateEvent::InitCaller => "init.caller",
            CallStateEvent::InitCallee => "init.callee",
            CallStateEvent::Connecting => "connecting",
            CallStateEvent::ConnectedCaller => "connected.caller",
            CallStateEvent::ConnectedCallee => "connected.callee",
            CallStateEvent::Terminate => "terminated",
        }
    }

    /// Hash field recording that this event has been applied.
    #[must_use]
    pub fn hash_field(self) -> String {
        format!("event.{}", self.as_str())
    }
}

impl FromStr for CallStateEvent {
    type Err = StoreError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "init" => Ok(CallStateEvent::Init),
            "init.caller" => Ok(CallStateEvent::InitCaller),
            "init.callee" => Ok(CallStateEvent::InitCallee),
            "connecting" => Ok(CallStateEvent::Connecting),
            "connected.caller" => Ok(CallStateEvent::ConnectedCaller),
            "connected.callee" => Ok(CallStateEvent::ConnectedCallee),
            "terminated" => Ok(CallStateEvent::Terminate),
            other => Err(StoreError::InvalidStateEvent(other.to_string())),
        }
    }
}

impl fmt::Display for CallStateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The transition table: the stage reached when `event` is applied in
/// `current`, assuming the event has not been applied before (the
/// persistence layer deduplicates).
///
/// `None` current means no state has been recorded yet; the first
/// event always lands in [`CallState::Init`].
#[must_use]
pub fn transition(current: Option<CallState>, event: CallStateEvent) -> CallState {
    match (current, event) {
        (_, CallStateEvent::Terminate) => CallState::Terminated,
        (None, _) => CallState::Init,
        (Some(state), _) => state.successor(),
    }
}
