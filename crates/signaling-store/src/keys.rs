//! Store key scheme.
//!
//! Every key the store reads or writes is built here. The formats are
//! interoperable with existing deployments and must not change:
//!
//! - `call.<callId>` / `callstate.<callId>` / `callStateReason.<callId>`
//! - `call.devices.<callId>.<caller|callee>`
//! - `callurl.<urlId>` / `userUrls.<userMac>` / `userCalls.<userMac>`
//! - `room.<roomToken>` / `userRooms.<userMac>` / `room.deleted.<ownerMac>`
//! - `roomparticipants.<roomToken>`
//! - `roomparticipant_access_token.<roomToken>.<hawkIdHmac>`
//! - `hawk.<hawkIdHmac>` / `userid.<hawkIdHmac>`
//! - `oauth.token.<hawkIdHmac>` / `oauth.state.<hawkIdHmac>`
//! - `spurls.<userMac>` / `spurls.<userMac>.<deviceId>`

use crate::types::DeviceType;

/// Heartbeat key written by `ping`.
pub const HEARTBEAT: &str = "heartbeat";

pub fn call(call_id: &str) -> String {
    format!("call.{call_id}")
}

pub fn call_state(call_id: &str) -> String {
    format!("callstate.{call_id}")
}

pub fn call_state_reason(call_id: &str) -> String {
    format!("callStateReason.{call_id}")
}

pub fn call_devices(call_id: &str, device: DeviceType) -> String {
    format!("call.devices.{call_id}.{}", device.as_str())
}

pub fn call_url(url_id: &str) -> String {
    format!("callurl.{url_id}")
}

pub fn user_call_urls(user_mac: &str) -> String {
    format!("userUrls.{user_mac}")
}

pub fn user_calls(user_mac: &str) -> String {
    format!("userCalls.{user_mac}")
}

pub fn room(room_token: &str) -> String {
    format!("room.{room_token}")
}

pub fn user_rooms(user_mac: &str) -> String {
    format!("userRooms.{user_mac}")
}

pub fn deleted_rooms(owner_mac: &str) -> String {
    format!("room.deleted.{owner_mac}")
}

pub fn room_participants(room_token: &str) -> String {
    format!("roomparticipants.{room_token}")
}

pub fn room_access_token(room_token: &str, hawk_id_hmac: &str) -> String {
    format!("roomparticipant_access_token.{room_token}.{hawk_id_hmac}")
}

pub fn hawk_session(hawk_id_hmac: &str) -> String {
    format!("hawk.{hawk_id_hmac}")
}

pub fn user_id(hawk_id_hmac: &str) -> String {
    format!("userid.{hawk_id_hmac}")
}

pub fn oauth_token(hawk_id_hmac: &str) -> String {
    format!("oauth.token.{hawk_id_hmac}")
}

pub fn oauth_state(hawk_id_hmac: &str) -> String {
    format!("oauth.state.{hawk_id_hmac}")
}

pub fn push_devices(user_mac: &str) -> String {
    format!("spurls.{user_mac}")
}

pub fn push_topic_urls(user_mac: &str, device_id: &str) -> String {
    format!("spurls.{user_mac}.{device_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    // The on-the-wire key formats are a compatibility contract; this
    // test pins every one of them byte for byte.
    #[test]
    fn key_formats_are_stable() {
        assert_eq!(call("1234"), "call.1234");
        assert_eq!(call_state("1234"), "callstate.1234");
        assert_eq!(call_state_reason("1234"), "callStateReason.1234");
        assert_eq!(
            call_devices("1234", DeviceType::Caller),
            "call.devices.1234.caller"
        );
        assert_eq!(
            call_devices("1234", DeviceType::Callee),
            "call.devices.1234.callee"
        );
        assert_eq!(call_url("_nxD4V4F"), "callurl._nxD4V4F");
        assert_eq!(user_call_urls("abc123"), "userUrls.abc123");
        assert_eq!(user_calls("abc123"), "userCalls.abc123");
        assert_eq!(room("QzBbvGmI"), "room.QzBbvGmI");
        assert_eq!(user_rooms("abc123"), "userRooms.abc123");
        assert_eq!(deleted_rooms("abc123"), "room.deleted.abc123");
        assert_eq!(room_participants("QzBbvGmI"), "roomparticipants.QzBbvGmI");
        assert_eq!(
            room_access_token("QzBbvGmI", "deadbeef"),
            "roomparticipant_access_token.QzBbvGmI.deadbeef"
        );
        assert_eq!(hawk_session("deadbeef"), "hawk.deadbeef");
        assert_eq!(user_id("deadbeef"), "userid.deadbeef");
        assert_eq!(oauth_token("deadbeef"), "oauth.token.deadbeef");
        assert_eq!(oauth_state("deadbeef"), "oauth.state.deadbeef");
        assert_eq!(push_devices("abc123"), "spurls.abc123");
        assert_eq!(
            push_topic_urls("abc123", "deadbeef"),
            "spurls.abc123.deadbeef"
        );
        assert_eq!(HEARTBEAT, "heartbeat");
    }
}
