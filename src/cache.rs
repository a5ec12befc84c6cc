use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde_derive::{Deserialize, Serialize};

use crate::enrichment::Enrichment;

/// Source of wall-clock time for cache bucketing.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// How cached enrichment is shared between tracks.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKeyPolicy {
    /// every track of a class shares one result per time window
    #[default]
    ClassMinute,
    /// each track identity gets its own result per time window
    TrackMinute,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Class { class: String, bucket: i64 },
    Track { id: u32, bucket: i64 },
}

#[derive(Debug)]
pub struct EnrichmentCache {
    entries: HashMap<CacheKey, Enrichment>,
    policy: CacheKeyPolicy,
    window_secs: i64,
    expiry: Duration,
}

impl EnrichmentCache {
    pub fn new(policy: CacheKeyPolicy, window_secs: i64, expiry_secs: i64) -> Self {
        Self {
            entries: HashMap::new(),
            policy,
            window_secs: window_secs.max(1),
            expiry: Duration::seconds(expiry_secs),
        }
    }

    #[inline]
    pub fn bucket(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp().div_euclid(self.window_secs)
    }

    pub fn key(&self, class: &str, track_id: u32, now: DateTime<Utc>) -> CacheKey {
        let bucket = self.bucket(now);

        match self.policy {
            CacheKeyPolicy::ClassMinute => CacheKey::Class {
                class: class.to_string(),
                bucket,
            },
            CacheKeyPolicy::TrackMinute => CacheKey::Track { id: track_id, bucket },
        }
    }

    #[inline]
    pub fn get(&self, key: &CacheKey) -> Option<&Enrichment> {
        self.entries.get(key)
    }

    #[inline]
    pub fn insert(&mut self, key: CacheKey, enrichment: Enrichment) {
        self.entries.insert(key, enrichment);
    }

    /// Removes entries whose result is older than the expiry age.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let expiry = self.expiry;

        self.entries.retain(|_, e| now - e.timestamp <= expiry);

        before - self.entries.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
