//! Shared test fixtures: a steerable clock, a capturing notification sink,
//! and a fixed-size member roster. All tests run against a real sqlite
//! database in a tempfile directory — no daemon process required.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use taskhive::config::HiveConfig;
use taskhive::error::CoreResult;
use taskhive::ports::{Clock, MemberRoster, NotificationSink};
use taskhive::storage::Storage;
use taskhive::CoreContext;

// ─── Clock ───────────────────────────────────────────────────────────────────

/// Steerable clock so tests can simulate many scheduler ticks instantly.
pub struct TestClock {
    now: Mutex<DateTime<Utc>>,
}

impl TestClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ─── Notification sink ───────────────────────────────────────────────────────

/// Records every notification so tests can assert on best-effort messaging.
#[derive(Default)]
pub struct CaptureSink {
    pub messages: Mutex<Vec<(String, String)>>,
}

impl CaptureSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSink for CaptureSink {
    async fn notify(&self, group_id: &str, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((group_id.to_string(), message.to_string()));
    }
}

// ─── Member roster ───────────────────────────────────────────────────────────

pub struct FixedRoster(pub u32);

#[async_trait]
impl MemberRoster for FixedRoster {
    async fn count_members(&self, _group_id: &str) -> CoreResult<u32> {
        Ok(self.0)
    }
}

// ─── Context bootstrap ───────────────────────────────────────────────────────

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

pub struct TestHarness {
    // Held so the database outlives the test body.
    pub dir: TempDir,
    pub storage: Storage,
    pub clock: Arc<TestClock>,
    pub sink: Arc<CaptureSink>,
    pub ctx: CoreContext,
}

pub async fn harness(now: DateTime<Utc>) -> TestHarness {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path()).await.unwrap();
    let clock = TestClock::at(now);
    let sink = CaptureSink::new();
    let config = Arc::new(HiveConfig::load(dir.path().to_path_buf()));
    let ctx = CoreContext::new(config, &storage, clock.clone(), sink.clone());
    TestHarness {
        dir,
        storage,
        clock,
        sink,
        ctx,
    }
}
