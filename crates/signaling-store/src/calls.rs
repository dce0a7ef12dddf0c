//! Call lifecycle: creation, state progression, termination.
//!
//! A call is ephemeral by construction: the record and its state hash
//! carry the fixed configured call duration as their TTL, so an
//! unanswered call evaporates on its own. State moves through the
//! implicit machine in `callstate`; this layer parses wire event
//! tokens, drives the store, and wakes the callee's devices.

use crate::callstate::{CallState, CallStateEvent};
use crate::errors::StoreError;
use crate::fanout::PushNotifier;
use crate::store::Storage;
use crate::types::CallRecord;
use common::tokens::generate_token;
use tracing::instrument;

/// Length of generated call identifiers and callee tokens.
const CALL_TOKEN_SIZE: usize = 16;

/// Validated request to place a call.
#[derive(Debug, Clone)]
pub struct CreateCallRequest {
    /// Calling user (HMAC identity).
    pub caller_id: String,
    /// Called user (HMAC identity); owns the record and gets woken.
    pub user_mac: String,
    /// Media session identifier for the call.
    pub session_id: String,
}

/// A call record paired with its lifecycle stage.
#[derive(Debug, Clone)]
pub struct CallWithState {
    pub record: CallRecord,
    pub state: CallState,
}

/// Call operations over the store and the push fan-out.
#[derive(Clone)]
pub struct CallService {
    storage: Storage,
    notifier: PushNotifier,
}

impl CallService {
    #[must_use]
    pub fn new(storage: Storage, notifier: PushNotifier) -> Self {
        Self { storage, notifier }
    }

    /// Place a call: mint identifiers, persist the record in `init`
    /// state, and wake the callee's devices.
    #[instrument(skip_all, fields(caller_id = %request.caller_id, user_mac = %request.user_mac))]
    pub async fn create_call(&self, request: CreateCallRequest) -> Result<CallRecord, StoreError> {
        let call_id = generate_token(CALL_TOKEN_SIZE)
            .map_err(|e| StoreError::Internal(format!("call id generation failed: {e}")))?;
        let callee_token = generate_token(CALL_TOKEN_SIZE)
            .map_err(|e| StoreError::Internal(format!("callee token generation failed: {e}")))?;

        let record = CallRecord {
            call_id,
            caller_id: request.caller_id,
            user_mac: request.user_mac,
            session_id: request.session_id,
            callee_token,
            timestamp: crate::store::now_secs(),
        };
        self.storage.add_call(&record).await?;

        let call_duration = self.storage.config().call_duration_seconds;
        self.storage
            .advance_call_state(&record.call_id, CallStateEvent::Init, Some(call_duration))
            .await?;

        let urls = self.storage.push_urls(&record.user_mac).await?;
        self.notifier.notify(&urls.calls, record.timestamp);
        Ok(record)
    }

    /// The call plus its lifecycle stage, if the record is still
    /// live.
    pub async fn call_with_state(
        &self,
        call_id: &str,
    ) -> Result<Option<CallWithState>, StoreError> {
        let Some(record) = self.storage.call(call_id).await? else {
            return Ok(None);
        };
        // The record exists, so an absent state hash reads back as
        // `Terminated` rather than `None`.
        let state = self
            .storage
            .call_state(call_id)
            .await?
            .unwrap_or(CallState::Terminated);
        Ok(Some(CallWithState { record, state }))
    }

    /// A user's pending calls with their states, oldest first.
    pub async fn user_calls(&self, user_mac: &str) -> Result<Vec<CallWithState>, StoreError> {
        let records = self.storage.user_calls(user_mac).await?;
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let state = self
                .storage
                .call_state(&record.call_id)
                .await?
                .unwrap_or(CallState::Terminated);
            out.push(CallWithState { record, state });
        }
        Ok(out)
    }

    /// Apply a wire event token to the call's state machine.
    ///
    /// Unknown tokens fail with [`StoreError::InvalidStateEvent`]
    /// before anything is written.
    #[instrument(skip_all, fields(call_id = %call_id, event = %event_token))]
    pub async fn advance_state(
        &self,
        call_id: &str,
        event_token: &str,
    ) -> Result<CallState, StoreError> {
        let event: CallStateEvent = event_token.parse()?;
        self.storage.advance_call_state(call_id, event, None).await
    }

    /// End a call: record the reason if one was given and drop the
    /// state hash. The record is left to expire on its own TTL, and
    /// while it lives the call reads back as `Terminated`.
    #[instrument(skip_all, fields(call_id = %call_id))]
    pub async fn terminate(
        &self,
        call_id: &str,
        reason: Option<&str>,
    ) -> Result<(), StoreError> {
        // The reason shares the record's remaining TTL, so it must be
        // written while the record still exists.
        if let Some(reason) = reason {
            match self.storage.set_call_termination_reason(call_id, reason).await {
                Ok(()) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        self.storage
            .advance_call_state(call_id, CallStateEvent::Terminate, None)
            .await?;
        Ok(())
    }

    /// Revoke a call outright: record and state both disappear, so
    /// the call reads back as unknown rather than terminated.
    /// Returns whether the record still existed.
    pub async fn revoke(&self, call_id: &str) -> Result<bool, StoreError> {
        self.storage
            .advance_call_state(call_id, CallStateEvent::Terminate, None)
            .await?;
        self.storage.delete_call(call_id).await
    }
}
