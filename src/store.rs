use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Durability requested for a partitioned write.
///
/// The sink always asks for `Soft` (no fsync before acknowledging); the
/// variant exists so a backend can be exercised with strict durability in
/// tests or tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    Soft,
    Hard,
}

/// Lifecycle notifications a connection pushes to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connection dropped; the sink starts its reconnect loop.
    Close,
    /// Connection (re-)established; the sink returns to direct inserts.
    Connect,
    /// Fatal: the sink disables itself.
    Timeout,
    /// Fatal: the sink disables itself.
    Error,
}

/// One established connection to the time-partitioned store.
///
/// Implementations transport rows to a concrete backend. The sink calls
/// `insert` from its driver task and never on an application thread.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Write `rows` into the partition named by `partition` (a UTC date
    /// string, one logical partition per day).
    ///
    /// Errors must be shaped per [`StoreError`] so the sink's retry
    /// classifier can distinguish recoverable payload problems
    /// (`CompileRejection`, `OversizedField`) from fatal ones.
    async fn insert(
        &self,
        partition: &str,
        rows: Vec<Value>,
        durability: Durability,
    ) -> Result<(), StoreError>;

    /// Try to re-establish the connection after a `Close` event.
    async fn reconnect(&self) -> Result<(), StoreError>;
}

/// Produces connections plus the event stream the sink listens on.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(
        &self,
        addr: &str,
    ) -> Result<(Arc<dyn Connection>, mpsc::Receiver<ConnectionEvent>), StoreError>;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Scripted in-memory store for sink and logger tests. Records every
    /// insert, fails according to a queue of scripted errors, and exposes
    /// the event sender so tests can inject lifecycle events.
    #[derive(Default)]
    pub struct MockStore {
        pub inserts: Mutex<Vec<(String, Vec<Value>)>>,
        pub failures: Mutex<VecDeque<StoreError>>,
        pub reconnect_ok: AtomicBool,
        pub refuse_connect: AtomicBool,
        pub connect_delay: Mutex<std::time::Duration>,
        pub event_tx: Mutex<Option<mpsc::Sender<ConnectionEvent>>>,
    }

    impl MockStore {
        pub fn new() -> Arc<Self> {
            let store = Arc::new(MockStore::default());
            store.reconnect_ok.store(true, Ordering::SeqCst);
            // long enough for records issued right after the first one to
            // land in the pre-connect buffer
            *store.connect_delay.lock() = std::time::Duration::from_millis(25);
            store
        }

        pub fn push_failure(&self, err: StoreError) {
            self.failures.lock().push_back(err);
        }

        pub fn insert_count(&self) -> usize {
            self.inserts.lock().len()
        }

        pub async fn send_event(&self, event: ConnectionEvent) {
            let tx = self.event_tx.lock().clone().expect("not connected");
            tx.send(event).await.expect("event channel closed");
        }
    }

    pub struct MockConnection {
        store: Arc<MockStore>,
    }

    #[async_trait]
    impl Connection for MockConnection {
        async fn insert(
            &self,
            partition: &str,
            rows: Vec<Value>,
            _durability: Durability,
        ) -> Result<(), StoreError> {
            if let Some(err) = self.store.failures.lock().pop_front() {
                return Err(err);
            }
            self.store
                .inserts
                .lock()
                .push((partition.to_string(), rows));
            Ok(())
        }

        async fn reconnect(&self) -> Result<(), StoreError> {
            if self.store.reconnect_ok.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(StoreError::Connection("still down".to_string()))
            }
        }
    }

    /// Factory handle over a shared [`MockStore`].
    pub struct MockFactory(pub Arc<MockStore>);

    #[async_trait]
    impl ConnectionFactory for MockFactory {
        async fn connect(
            &self,
            _addr: &str,
        ) -> Result<(Arc<dyn Connection>, mpsc::Receiver<ConnectionEvent>), StoreError> {
            let delay = *self.0.connect_delay.lock();
            tokio::time::sleep(delay).await;
            if self.0.refuse_connect.load(Ordering::SeqCst) {
                return Err(StoreError::Connection("refused".to_string()));
            }
            let (tx, rx) = mpsc::channel(16);
            *self.0.event_tx.lock() = Some(tx);
            let conn = MockConnection {
                store: Arc::clone(&self.0),
            };
            Ok((Arc::new(conn), rx))
        }
    }
}
