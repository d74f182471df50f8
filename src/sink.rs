use crate::error::StoreError;
use crate::record::{Level, Record};
use crate::serialize::{truncate_long_strings, MAX_FIELD_CHARS};
use crate::store::{Connection, ConnectionEvent, ConnectionFactory, Durability};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};

/// Lifecycle of the sink's single outbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// No connection attempted yet; records accumulate in the buffer.
    Uninitialized,
    /// Exactly one connection attempt in flight; buffer keeps growing.
    Connecting,
    /// Records are inserted directly, in call order.
    Connected,
    /// Fixed-interval retry loop active; records arriving now are dropped,
    /// not buffered.
    Reconnecting,
    /// Terminal. Everything is silently dropped.
    Disabled,
}

#[derive(Clone, Debug)]
pub struct SinkConfig {
    /// Address handed to the connection factory.
    pub addr: String,
    /// Fixed delay between reconnect attempts after a close event.
    pub reconnect_interval: Duration,
    pub durability: Durability,
}

impl SinkConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        SinkConfig {
            addr: addr.into(),
            reconnect_interval: Duration::from_secs(1),
            durability: Durability::Soft,
        }
    }
}

/// Durable delivery channel for [`Record`]s.
///
/// `insert` is fire-and-forget: it enqueues the record and returns; delivery,
/// drop or console fallback happens on the driver task and is never awaited
/// by callers. One instance owns one outbound connection; tests construct
/// isolated instances with their own factory.
pub struct DurableSink {
    tx: mpsc::UnboundedSender<Record>,
    state: watch::Receiver<SinkState>,
    driver: JoinHandle<()>,
}

impl DurableSink {
    /// Spawn the driver task. No connection is attempted until the first
    /// record arrives.
    pub fn new(factory: Arc<dyn ConnectionFactory>, config: SinkConfig) -> DurableSink {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SinkState::Uninitialized);
        let driver = tokio::spawn(run(factory, config, rx, state_tx));
        DurableSink {
            tx,
            state: state_rx,
            driver,
        }
    }

    /// Hand a record to the sink. Never blocks, never fails from the
    /// caller's point of view.
    pub fn insert(&self, record: Record) {
        let _ = self.tx.send(record);
    }

    pub fn state(&self) -> SinkState {
        *self.state.borrow()
    }

    /// Watch handle for observing state transitions.
    pub fn state_watch(&self) -> watch::Receiver<SinkState> {
        self.state.clone()
    }

    /// Close the intake and wait for the driver to finish in-flight work.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.driver.await;
    }
}

async fn run(
    factory: Arc<dyn ConnectionFactory>,
    config: SinkConfig,
    mut rx: mpsc::UnboundedReceiver<Record>,
    state: watch::Sender<SinkState>,
) {
    // Uninitialized until the first record arrives; that record triggers
    // the one and only initial connection attempt.
    let Some(first) = rx.recv().await else { return };
    let mut buffer = vec![first];
    state.send_replace(SinkState::Connecting);

    let connect = factory.connect(&config.addr);
    tokio::pin!(connect);
    let mut rx_open = true;
    let (conn, mut events) = loop {
        tokio::select! {
            res = &mut connect => match res {
                Ok(pair) => break pair,
                Err(e) => {
                    // Surfaces only here, on the path of the triggering
                    // write; every later insert is swallowed silently.
                    eprintln!("log store connection failed, sink disabled: {e}");
                    state.send_replace(SinkState::Disabled);
                    while rx.recv().await.is_some() {}
                    return;
                }
            },
            maybe = rx.recv(), if rx_open => match maybe {
                Some(record) => buffer.push(record),
                None => rx_open = false,
            },
        }
    };

    // Flush everything buffered while connecting as one ordered batch.
    if !buffer.is_empty() {
        if let Err(e) = write_records(&*conn, &config, std::mem::take(&mut buffer)).await {
            eprintln!("log store flush failed: {e}");
        }
    }
    state.send_replace(SinkState::Connected);
    if !rx_open {
        return;
    }

    let mut retry = time::interval(config.reconnect_interval);
    retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut events_open = true;

    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                None => return,
                Some(record) => {
                    if *state.borrow() == SinkState::Connected {
                        if let Err(e) = write_records(&*conn, &config, vec![record]).await {
                            eprintln!("log store insert failed: {e}");
                        }
                    }
                    // Reconnecting and Disabled drop records here: the
                    // buffer is only wired up before the first connect.
                }
            },
            maybe = events.recv(), if events_open => match maybe {
                None => events_open = false,
                Some(ConnectionEvent::Close) => {
                    let current = *state.borrow();
                    if current != SinkState::Reconnecting && current != SinkState::Disabled {
                        retry.reset();
                        state.send_replace(SinkState::Reconnecting);
                    }
                }
                Some(ConnectionEvent::Connect) => {
                    if *state.borrow() != SinkState::Disabled {
                        state.send_replace(SinkState::Connected);
                    }
                }
                Some(ConnectionEvent::Timeout) | Some(ConnectionEvent::Error) => {
                    state.send_replace(SinkState::Disabled);
                }
            },
            _ = retry.tick(), if *state.borrow() == SinkState::Reconnecting => {
                // Fixed interval, no backoff growth, no attempt cap and no
                // cancellation handle; runs until success or until a fatal
                // event flips the state.
                if conn.reconnect().await.is_ok() {
                    state.send_replace(SinkState::Connected);
                }
            },
        }
    }
}

/// A record batch in flight to storage. `second_attempt` limits retries to
/// exactly one re-issue after payload sanitization; batches and single
/// records share the policy and are never split.
struct PendingWrite {
    records: Vec<Record>,
    second_attempt: bool,
}

impl PendingWrite {
    fn rows(&self) -> Result<Vec<Value>, StoreError> {
        self.records
            .iter()
            .map(|r| serde_json::to_value(r).map_err(|e| StoreError::Other(e.to_string())))
            .collect()
    }

    /// Round-trip every body through serialize/parse to strip anomalies the
    /// store choked on.
    fn sanitize_bodies(&mut self) -> Result<(), StoreError> {
        for record in &mut self.records {
            let text =
                serde_json::to_string(&record.body).map_err(|e| StoreError::Other(e.to_string()))?;
            record.body =
                serde_json::from_str(&text).map_err(|e| StoreError::Other(e.to_string()))?;
        }
        Ok(())
    }

    fn truncate_long_strings(&mut self) {
        for record in &mut self.records {
            truncate_long_strings(&mut record.body, MAX_FIELD_CHARS);
        }
    }

    /// Downgrade to warn and record the rejection message under `code`, or
    /// `retryCode` when a code is already present.
    fn annotate(&mut self, message: &str) {
        for record in &mut self.records {
            record.level = Level::Warn;
            if let Value::Object(map) = &mut record.body {
                let key = if map.contains_key("code") {
                    "retryCode"
                } else {
                    "code"
                };
                map.insert(key.to_string(), Value::String(message.to_string()));
            }
        }
    }

    /// Local fallback channel of last resort.
    fn dump_to_console(&self) {
        for record in &self.records {
            match serde_json::to_string(record) {
                Ok(text) => eprintln!("{text}"),
                Err(_) => eprintln!("{record:?}"),
            }
        }
    }
}

/// One logical partition per UTC day.
pub(crate) fn partition_key(at: DateTime<Utc>) -> String {
    at.format("%Y_%m_%d").to_string()
}

async fn write_records(
    conn: &dyn Connection,
    config: &SinkConfig,
    records: Vec<Record>,
) -> Result<(), StoreError> {
    let mut pending = PendingWrite {
        records,
        second_attempt: false,
    };
    loop {
        let rows = match pending.rows() {
            Ok(rows) => rows,
            Err(e) => {
                pending.dump_to_console();
                return Err(e);
            }
        };
        let partition = partition_key(Utc::now());
        let err = match conn.insert(&partition, rows, config.durability).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if pending.second_attempt {
            pending.dump_to_console();
            return Err(err);
        }
        match err {
            StoreError::CompileRejection(message) => {
                if let Err(e) = pending.sanitize_bodies() {
                    pending.dump_to_console();
                    return Err(e);
                }
                pending.annotate(&message);
            }
            StoreError::OversizedField => {
                pending.truncate_long_strings();
                pending.annotate(&StoreError::OversizedField.to_string());
            }
            other => {
                pending.dump_to_console();
                return Err(other);
            }
        }
        pending.second_attempt = true;
    }
}
