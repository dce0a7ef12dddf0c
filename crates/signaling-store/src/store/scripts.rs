//! Lua scripts for atomic multi-step store operations.
//!
//! Two operations cannot be expressed as a plain MULTI/EXEC batch
//! because they branch on data they read:
//!
//! - room admission must re-read the live participant population
//!   before deciding, or two concurrent joiners could both slip past a
//!   capacity boundary;
//! - call-state advancement must deduplicate the event against the
//!   already-applied set in the same step that writes the new state.
//!
//! Both run as precompiled [`redis::Script`]s so the check and the
//! write are a single atomic unit on the store side.

/// Atomic room admission.
///
/// Walks the participant hash, opportunistically deleting entries
/// whose embedded expiry has passed, and counts the remaining active
/// participants and their smallest declared capacity. Admission is
/// rejected when `min(maxSize, min clientMaxSize) <= active` (room
/// full) or when the joiner's own declared capacity `<= active`. On
/// success the participant entry and its companion access token are
/// written together.
///
/// A rejoin by an already-present hawk id replaces its own entry and
/// is not counted against itself.
///
/// Keys:
/// - KEYS[1]: participant hash (`roomparticipants.<roomToken>`)
/// - KEYS[2]: companion access token key
///
/// Arguments:
/// - ARGV[1]: current unix time (seconds)
/// - ARGV[2]: room maxSize
/// - ARGV[3]: joiner hawkIdHmac (hash field)
/// - ARGV[4]: joiner clientMaxSize
/// - ARGV[5]: participant JSON (expiry embedded)
/// - ARGV[6]: participant TTL in milliseconds
///
/// Returns `{1, active_count_after_join}` on success,
/// `{-1, effective_capacity}` when the room is full,
/// `{-2, active_count}` when the joiner's capacity is too low.
pub const JOIN_ROOM: &str = r#"
local now = tonumber(ARGV[1])
local max_size = tonumber(ARGV[2])
local joiner = ARGV[3]
local joiner_cap = tonumber(ARGV[4])

local entries = redis.call('HGETALL', KEYS[1])
local active = 0
local min_cap = max_size
for i = 1, #entries, 2 do
    local field = entries[i]
    local ok, data = pcall(cjson.decode, entries[i + 1])
    if not ok or type(data) ~= 'table'
        or tonumber(data.expiresAt) == nil
        or tonumber(data.expiresAt) <= now then
        -- Lazily expired (or unreadable) entry: prune it now.
        redis.call('HDEL', KEYS[1], field)
    elseif field ~= joiner then
        active = active + 1
        local cap = tonumber(data.clientMaxSize)
        if cap ~= nil and cap < min_cap then
            min_cap = cap
        end
    end
end

local effective = max_size
if min_cap < effective then
    effective = min_cap
end
if effective <= active then
    return {-1, effective}
end
if joiner_cap <= active then
    return {-2, active}
end

redis.call('HSET', KEYS[1], joiner, ARGV[5])
redis.call('SET', KEYS[2], '', 'PX', tonumber(ARGV[6]))
return {1, active + 1}
"#;

/// Atomic call-state advancement.
///
/// The state hash carries the current state name under `state` plus
/// one field per applied event. Reapplying an event is a no-op that
/// returns the current state; a new event advances the state by one
/// ordinal (saturating at the final name in ARGV).
///
/// Keys:
/// - KEYS[1]: state hash (`callstate.<callId>`)
///
/// Arguments:
/// - ARGV[1]: event field name (`event.<wire token>`)
/// - ARGV[2]: TTL in milliseconds (`<= 0` leaves the expiry untouched)
/// - ARGV[3..]: state names in ordinal order
///
/// Returns the state name after the call.
pub const ADVANCE_CALL_STATE: &str = r#"
local current = redis.call('HGET', KEYS[1], 'state')
if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 1 then
    return current
end

local applied = redis.call('HLEN', KEYS[1])
if current then
    applied = applied - 1
end

local ordinal = applied + 1
local max_ordinal = #ARGV - 2
if ordinal > max_ordinal then
    ordinal = max_ordinal
end

local name = ARGV[ordinal + 2]
redis.call('HSET', KEYS[1], 'state', name, ARGV[1], '1')

local ttl = tonumber(ARGV[2])
if ttl ~= nil and ttl > 0 then
    redis.call('PEXPIRE', KEYS[1], ttl)
end
return name
"#;
