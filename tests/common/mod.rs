//! Shared fakes for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use cip_functions::messaging::{IncomingMessage, OutgoingMessage, PublishError, Publisher};
use cip_functions::storage::{MemoryStore, Storage, StoreError};
use cip_functions::things::{Thing, ThingsClient, ThingsError};

pub fn thing(id: &str, thing_type: &str, tenant: Option<&str>) -> Thing {
    Thing {
        id: id.to_string(),
        thing_type: thing_type.to_string(),
        tenant: tenant.map(str::to_string),
        ..Thing::default()
    }
}

pub fn message(topic: &str, content_type: &str, body: Value) -> IncomingMessage {
    IncomingMessage::new(topic, content_type, body.to_string())
}

/// Registry fake: subjects map to related things, things are looked up by ID.
#[derive(Default)]
pub struct FakeThings {
    related: HashMap<String, Vec<Thing>>,
    things: HashMap<String, Thing>,
    error: Option<ThingsError>,
    delay: Option<Duration>,
    pub related_calls: AtomicUsize,
    pub find_by_id_calls: AtomicUsize,
}

impl FakeThings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relate `subject` to `thing` and make `thing` resolvable by its ID.
    pub fn relate(mut self, subject: &str, thing: Thing) -> Self {
        self.related
            .entry(subject.to_string())
            .or_default()
            .push(thing.clone());
        self.things.insert(thing.id.clone(), thing);
        self
    }

    pub fn failing(error: ThingsError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn lookups(&self) -> usize {
        self.related_calls.load(Ordering::SeqCst) + self.find_by_id_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThingsClient for FakeThings {
    async fn find_related_things(&self, thing_id: &str) -> Result<Vec<Thing>, ThingsError> {
        self.related_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = &self.error {
            return Err(e.clone());
        }

        self.related
            .get(thing_id)
            .cloned()
            .ok_or(ThingsError::NotFound)
    }

    async fn find_by_id(&self, thing_id: &str) -> Result<Thing, ThingsError> {
        self.find_by_id_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(e) = &self.error {
            return Err(e.clone());
        }

        self.things
            .get(thing_id)
            .cloned()
            .ok_or(ThingsError::NotFound)
    }
}

/// Publisher fake that records every message.
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<OutgoingMessage>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<OutgoingMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.messages()
            .iter()
            .map(|m| serde_json::from_slice(&m.body).unwrap())
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, msg: &OutgoingMessage) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Transport("broker unavailable".to_string()));
        }

        self.messages.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

/// Store wrapper counting every call; optionally refuses writes.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    fail_writes: bool,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst) + self.writes.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn write_error() -> StoreError {
        StoreError::Database(sea_orm::DbErr::Custom("disk full".to_string()))
    }
}

#[async_trait]
impl Storage for CountingStore {
    async fn create(&self, id: &str, type_name: &str, value: Value) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(Self::write_error());
        }
        self.inner.create(id, type_name, value).await
    }

    async fn read(&self, id: &str, type_name: &str) -> Result<Value, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(id, type_name).await
    }

    async fn update(&self, id: &str, type_name: &str, value: Value) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(Self::write_error());
        }
        self.inner.update(id, type_name, value).await
    }

    async fn exists(&self, id: &str, type_name: &str) -> Result<bool, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.exists(id, type_name).await
    }
}
