//! TTL-scoped KV cache buckets backing the webhook ingestor — spec §4.8.
//!
//! Two buckets are used in practice: `"requests"` (3-day TTL) and
//! `"progress"` (1-day TTL). Upserting the same key refreshes its TTL and
//! overwrites its value (last-write-wins, spec §5/§8 invariant 6).

use rusqlite::{params, Connection};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::StoreError;

pub struct CacheBucket<'c> {
    conn: &'c Connection,
    bucket: &'static str,
}

impl<'c> CacheBucket<'c> {
    pub fn new(conn: &'c Connection, bucket: &'static str) -> Self {
        CacheBucket { conn, bucket }
    }

    /// Upsert `key -> value`, refreshing `expires_at` to `now + ttl_secs`.
    pub fn upsert<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        now: i64,
        ttl_secs: i64,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        let expires_at = now + ttl_secs;
        self.conn.execute(
            "INSERT INTO cache_bucket (bucket, key, value, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(bucket, key) DO UPDATE SET value=excluded.value, expires_at=excluded.expires_at",
            params![self.bucket, key, json, expires_at],
        )?;
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str, now: i64) -> Result<Option<T>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT value FROM cache_bucket WHERE bucket = ?1 AND key = ?2 AND expires_at > ?3",
        )?;
        let mut rows = stmt.query(params![self.bucket, key, now])?;
        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    /// All non-expired keys in this bucket, for the background drainer.
    pub fn drain<T: DeserializeOwned>(&self, now: i64) -> Result<Vec<(String, T)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT key, value FROM cache_bucket WHERE bucket = ?1 AND expires_at > ?2 ORDER BY key ASC",
        )?;
        let rows = stmt.query_map(params![self.bucket, now], |row| {
            let key: String = row.get(0)?;
            let json: String = row.get(1)?;
            Ok((key, json))
        })?;
        let mut out = Vec::new();
        for r in rows {
            let (key, json) = r?;
            out.push((key, serde_json::from_str(&json)?));
        }
        Ok(out)
    }

    /// Remove every entry whose `expires_at <= now`. Returns the count removed.
    pub fn sweep_expired(&self, now: i64) -> Result<usize, StoreError> {
        let n = self.conn.execute(
            "DELETE FROM cache_bucket WHERE bucket = ?1 AND expires_at <= ?2",
            params![self.bucket, now],
        )?;
        Ok(n)
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM cache_bucket WHERE bucket = ?1 AND key = ?2", params![self.bucket, key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(include_str!("schema.sql")).unwrap();
        conn
    }

    #[test]
    fn upsert_refreshes_ttl_and_dedups() {
        let conn = setup();
        let bucket = CacheBucket::new(&conn, "requests");
        bucket.upsert("item-1", &"payload-a", 1_000, 3 * 86_400).unwrap();
        bucket.upsert("item-1", &"payload-b", 1_500, 3 * 86_400).unwrap();

        let drained: Vec<(String, String)> = bucket.drain(1_500).unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].1, "payload-b");
    }

    #[test]
    fn sweep_removes_expired_only() {
        let conn = setup();
        let bucket = CacheBucket::new(&conn, "progress");
        bucket.upsert("a", &1, 0, 86_400).unwrap();
        bucket.upsert("b", &2, 0, 200_000).unwrap();
        let removed = bucket.sweep_expired(90_000).unwrap();
        assert_eq!(removed, 1);
        let remaining: Vec<(String, i64)> = bucket.drain(90_000).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0, "b");
    }
}
