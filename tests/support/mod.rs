#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{Local, NaiveDate, TimeZone, Utc};
use confessions::{
    AppResult, Comment, Confession, FeedState, FeedSync, NewComment, NewConfession, Profile,
    remote::{DataStore, MemoryBackend},
};
use mockable::{Clock, MockClock};
use time::macros::datetime;
use tokio::sync::Notify;
use uuid::Uuid;

pub fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// A clock stuck at noon, local time, on `date`.
pub fn clock_on(date: NaiveDate) -> Arc<dyn Clock> {
    let noon = Local
        .from_local_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
        .earliest()
        .unwrap();
    let mut clock = MockClock::new();
    clock.expect_local().return_const(noon);
    clock.expect_utc().return_const(noon.with_timezone(&Utc));
    Arc::new(clock)
}

/// A stored confession with id `n`, posted `minutes_ago` before noon on 2024-06-01.
pub fn confession(n: u128, likes: u32, minutes_ago: i64) -> Confession {
    Confession {
        id: Uuid::from_u128(n),
        created_at: datetime!(2024-06-01 12:00 UTC) - time::Duration::minutes(minutes_ago),
        user_id: Uuid::from_u128(9_000 + n),
        content: format!("confession number {n}"),
        location_name: None,
        latitude: None,
        longitude: None,
        likes,
        is_anonymous: true,
    }
}

pub fn likes_of(confessions: &[Confession], n: u128) -> Option<u32> {
    confessions.iter().find(|c| c.id == Uuid::from_u128(n)).map(|c| c.likes)
}

pub fn ids(confessions: &[Confession]) -> Vec<u128> {
    confessions.iter().map(|c| c.id.as_u128()).collect()
}

/// Waits until the feed satisfies `ready`, for at most a few seconds.
pub async fn settled(feed: &FeedSync, ready: impl FnMut(&FeedState) -> bool) -> FeedState {
    let mut updates = feed.watch();
    let state = tokio::time::timeout(Duration::from_secs(5), updates.wait_for(ready))
        .await
        .expect("feed never settled")
        .expect("feed channel closed")
        .clone();
    state
}

/// Holds calls that pass through it until the test lets them go.
#[derive(Default)]
pub struct Gate {
    armed: AtomicBool,
    arrived: Notify,
    release: Notify,
}

impl Gate {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    /// Resolves once a call is parked at the gate.
    pub async fn arrived(&self) {
        self.arrived.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        if self.armed.load(Ordering::Acquire) {
            self.arrived.notify_one();
            self.release.notified().await;
        }
    }
}

/// A [`MemoryBackend`] whose slow calls can be parked mid-flight.
pub struct GatedStore {
    pub inner: Arc<MemoryBackend>,
    pub lists: Gate,
    pub likes: Gate,
    pub opens: Gate,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryBackend>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            lists: Gate::default(),
            likes: Gate::default(),
            opens: Gate::default(),
        })
    }
}

#[async_trait]
impl DataStore for GatedStore {
    async fn list_confessions(&self) -> AppResult<Vec<Confession>> {
        self.lists.pass().await;
        self.inner.list_confessions().await
    }

    async fn get_confession(&self, id: Uuid) -> AppResult<Confession> {
        self.opens.pass().await;
        self.inner.get_confession(id).await
    }

    async fn insert_confession(&self, confession: &NewConfession) -> AppResult<()> {
        self.inner.insert_confession(confession).await
    }

    async fn increment_likes(&self, id: Uuid) -> AppResult<u32> {
        self.likes.pass().await;
        self.inner.increment_likes(id).await
    }

    async fn get_profile(&self, user_id: Uuid) -> AppResult<Profile> {
        self.inner.get_profile(user_id).await
    }

    async fn insert_profile(&self, user_id: Uuid) -> AppResult<()> {
        self.inner.insert_profile(user_id).await
    }

    async fn set_last_confession_date(&self, user_id: Uuid, date: &str) -> AppResult<()> {
        self.inner.set_last_confession_date(user_id, date).await
    }

    async fn list_comments(&self, confession_id: Uuid) -> AppResult<Vec<Comment>> {
        self.inner.list_comments(confession_id).await
    }

    async fn insert_comment(&self, comment: &NewComment) -> AppResult<Comment> {
        self.inner.insert_comment(comment).await
    }
}
