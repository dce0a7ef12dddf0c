//! Lazy index reconciliation.
//!
//! User-scoped indexes (`userUrls.*`, `userCalls.*`, `userRooms.*`)
//! are plain sets of primary keys, and the primaries expire on their
//! own TTLs. An index must never yield a key whose primary entry has
//! expired, so every listing read goes through this one routine: fetch
//! the members, bulk-fetch the primaries, drop the members whose
//! primary is gone from the index as a side effect, and return the
//! survivors sorted. Removing an already-removed member is a no-op, so
//! concurrent reconciles are harmless.

use crate::errors::StoreError;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;

/// Fetch the entries an index points at, pruning dangling members.
///
/// `sort_key` orders the result (insertion timestamp for calls and
/// urls, update time for rooms).
pub(crate) async fn reconcile_index<T, K>(
    conn: &mut MultiplexedConnection,
    index_key: &str,
    sort_key: K,
) -> Result<Vec<T>, StoreError>
where
    T: DeserializeOwned,
    K: Fn(&T) -> i64,
{
    let members: Vec<String> = conn.smembers(index_key).await?;
    if members.is_empty() {
        return Ok(Vec::new());
    }

    let values: Vec<Option<String>> = redis::cmd("MGET")
        .arg(&members)
        .query_async(&mut *conn)
        .await?;

    let mut stale: Vec<String> = Vec::new();
    let mut present: Vec<T> = Vec::new();
    for (member, value) in members.iter().zip(values) {
        match value {
            Some(raw) => present.push(serde_json::from_str(&raw)?),
            None => stale.push(member.clone()),
        }
    }

    if !stale.is_empty() {
        tracing::debug!(
            target: "store.reconcile",
            index_key = %index_key,
            stale_count = stale.len(),
            "Pruning expired members from index"
        );
        let _: i64 = conn.srem(index_key, stale).await?;
    }

    present.sort_by_key(|entry| sort_key(entry));
    Ok(present)
}
