// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The Redis-stream-backed event bus (§4.1): one logical stream, two
//! fan-out modes (consumer group for "consume", one private group per
//! process for "subscribe"), per-handler coalescing, and a failure
//! observer that never blocks acknowledgement.

use crate::coalesce::Coalescer;
use crate::error::EventBusError;
use crate::handler::{FailureObserver, Registration};
use bai_core::Event;
use bai_wire::{decode_stream_entry, encode_stream_entry};
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const DEFAULT_STREAM_KEY: &str = "events";
pub const DEFAULT_GROUP_NAME: &str = "manager";

/// Handle to a running event bus. Cloning shares the underlying
/// connection and registrations.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

struct Inner {
    conn: tokio::sync::Mutex<ConnectionManager>,
    stream_key: String,
    group_name: String,
    consumer_id: String,
    consume: RwLock<Vec<Registration>>,
    subscribe: RwLock<Vec<Registration>>,
    observer: Option<Arc<dyn FailureObserver>>,
    cancel: CancellationToken,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl EventBus {
    pub async fn connect(
        redis_url: &str,
        stream_key: impl Into<String>,
        group_name: impl Into<String>,
        consumer_id: impl Into<String>,
        observer: Option<Arc<dyn FailureObserver>>,
    ) -> Result<Self, EventBusError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        let bus = Self {
            inner: Arc::new(Inner {
                conn: tokio::sync::Mutex::new(conn),
                stream_key: stream_key.into(),
                group_name: group_name.into(),
                consumer_id: consumer_id.into(),
                consume: RwLock::new(Vec::new()),
                subscribe: RwLock::new(Vec::new()),
                observer,
                cancel: CancellationToken::new(),
                tasks: tokio::sync::Mutex::new(Vec::new()),
            }),
        };
        bus.ensure_group(&bus.inner.group_name).await?;
        bus.ensure_group(&bus.private_group_name()).await?;
        Ok(bus)
    }

    fn private_group_name(&self) -> String {
        format!("sub-{}", self.inner.consumer_id)
    }

    async fn ensure_group(&self, group: &str) -> Result<(), EventBusError> {
        let mut conn = self.inner.conn.lock().await;
        let result: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.inner.stream_key, group, "$")
            .await;
        if let Err(e) = result {
            // BUSYGROUP: group already exists. Anything else is a real error.
            if !e.to_string().contains("BUSYGROUP") {
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// `produce_event(event, source)` (§4.1).
    pub async fn produce_event(&self, event: &Event, source: &str) -> Result<String, EventBusError> {
        let bytes = encode_stream_entry(event, source)?;
        let mut conn = self.inner.conn.lock().await;
        let id: String = conn
            .xadd(&self.inner.stream_key, "*", &[("entry", bytes)])
            .await?;
        Ok(id)
    }

    /// Register a consumer-group handler: exactly one worker across the
    /// deployment handles each matching event.
    pub fn register_consumer(&self, registration: Registration) {
        self.inner.consume.write().push(registration);
    }

    /// Register a broadcast handler: every worker process receives every
    /// matching event.
    pub fn register_subscriber(&self, registration: Registration) {
        self.inner.subscribe.write().push(registration);
    }

    /// Spawns the two poll loops (§4.1 "two persistent task groups").
    pub async fn start(&self) {
        let consume_bus = self.clone();
        let consume_handle = tokio::spawn(async move {
            consume_bus.poll_loop(consume_bus.inner.group_name.clone(), true).await;
        });
        let subscribe_bus = self.clone();
        let private_group = self.private_group_name();
        let subscribe_handle = tokio::spawn(async move {
            subscribe_bus.poll_loop(private_group, false).await;
        });
        let mut tasks = self.inner.tasks.lock().await;
        tasks.push(consume_handle);
        tasks.push(subscribe_handle);
    }

    async fn poll_loop(&self, group: String, is_consume_mode: bool) {
        let mut coalescers: HashMap<usize, mpsc::UnboundedSender<Event>> = HashMap::new();
        // Spawn one coalescing task per registration that asked for it.
        {
            let registrations = if is_consume_mode { self.inner.consume.read() } else { self.inner.subscribe.read() };
            for (idx, reg) in registrations.iter().enumerate() {
                if let Some(opts) = reg.coalesce {
                    let (tx, rx) = mpsc::unbounded_channel();
                    coalescers.insert(idx, tx);
                    let handler = reg.handler.clone();
                    let event_name = reg.event_name;
                    let observer = self.inner.observer.clone();
                    let cancel = self.inner.cancel.clone();
                    tokio::spawn(coalesce_task(opts, rx, handler, event_name, observer, cancel));
                }
            }
        }

        loop {
            if self.inner.cancel.is_cancelled() {
                return;
            }

            let opts = redis::streams::StreamReadOptions::default()
                .group(&group, &self.inner.consumer_id)
                .count(16)
                .block(500);
            let read: redis::RedisResult<redis::streams::StreamReadReply> = {
                let mut conn = self.inner.conn.lock().await;
                conn.xread_options(&[&self.inner.stream_key], &[">"], &opts).await
            };

            let reply = match read {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "event bus poll failed, retrying");
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    continue;
                }
            };

            for stream_key in reply.keys {
                for stream_id in stream_key.ids {
                    self.dispatch_entry(&group, is_consume_mode, &stream_id, &coalescers).await;
                }
            }
        }
    }

    async fn dispatch_entry(
        &self,
        group: &str,
        is_consume_mode: bool,
        stream_id: &redis::streams::StreamId,
        coalescers: &HashMap<usize, mpsc::UnboundedSender<Event>>,
    ) {
        let bytes = match stream_id.map.get("entry") {
            Some(redis::Value::BulkString(bytes)) => bytes,
            _ => {
                self.ack(group, &stream_id.id).await;
                return;
            }
        };
        let entry = match decode_stream_entry(bytes) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "failed to decode stream entry, acking and dropping");
                self.ack(group, &stream_id.id).await;
                return;
            }
        };

        let registrations = if is_consume_mode { self.inner.consume.read() } else { self.inner.subscribe.read() };
        for (idx, reg) in registrations.iter().enumerate() {
            if !reg.matches(&entry.args) {
                continue;
            }
            if let Some(tx) = coalescers.get(&idx) {
                let _ = tx.send(entry.args.clone());
                continue;
            }
            let start = Instant::now();
            if let Err(e) = reg.handler.handle(std::slice::from_ref(&entry.args)).await {
                if let Some(observer) = &self.inner.observer {
                    observer.on_failure(reg.event_name, start.elapsed(), &e);
                }
            }
        }
        drop(registrations);
        self.ack(group, &stream_id.id).await;
    }

    async fn ack(&self, group: &str, id: &str) {
        let mut conn = self.inner.conn.lock().await;
        let _: redis::RedisResult<()> = conn.xack(&self.inner.stream_key, group, &[id]).await;
    }

    /// `close()` (§4.1): cancels the two poll loops and drains their tasks.
    pub async fn close(&self) {
        self.inner.cancel.cancel();
        let mut tasks = self.inner.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
        info!("event bus closed");
    }
}

async fn coalesce_task(
    opts: crate::coalesce::CoalesceOpts,
    mut rx: mpsc::UnboundedReceiver<Event>,
    handler: Arc<dyn crate::handler::EventHandler>,
    event_name: &'static str,
    observer: Option<Arc<dyn FailureObserver>>,
    cancel: CancellationToken,
) {
    let mut coalescer = Coalescer::new(opts);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        let key = event.name().to_string();
                        if let Some(batch) = coalescer.push(key, event) {
                            invoke(&handler, &batch, event_name, &observer).await;
                        }
                    }
                    None => return,
                }
            }
            expired = coalescer.next_expired(), if !coalescer.is_empty() => {
                if let Some((_key, batch)) = expired {
                    invoke(&handler, &batch, event_name, &observer).await;
                }
            }
        }
    }
}

async fn invoke(
    handler: &Arc<dyn crate::handler::EventHandler>,
    batch: &[Event],
    event_name: &'static str,
    observer: &Option<Arc<dyn FailureObserver>>,
) {
    let start = Instant::now();
    if let Err(e) = handler.handle(batch).await {
        if let Some(observer) = observer {
            observer.on_failure(event_name, start.elapsed(), &e);
        }
    }
}
