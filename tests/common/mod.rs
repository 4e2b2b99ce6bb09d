// tests/common/mod.rs
//
// In-memory stand-ins for the live feed transport and the durable store,
// shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use freight_board::channel::transport::{Connector, Transport};
use freight_board::error::{PersistenceError, TransportError};
use freight_board::store::StoreBackend;

// ------------------------------------------------------------
// Transport
// ------------------------------------------------------------

/// Server side of one in-memory connection.
pub struct MemoryPeer {
    /// Frames the manager sent (probes).
    pub from_client: mpsc::UnboundedReceiver<String>,
    /// Push frames to the manager; dropping it closes the connection.
    pub to_client: mpsc::UnboundedSender<String>,
}

/// Each `connect` pops the next scripted outcome: `true` accepts and hands the
/// peer to the test through `peers`, `false` refuses. Once the script is
/// empty every attempt is refused.
#[derive(Clone)]
pub struct MemoryConnector {
    script: Arc<Mutex<VecDeque<bool>>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
    attempts: Arc<AtomicU32>,
}

impl MemoryConnector {
    pub fn new(script: impl IntoIterator<Item = bool>) -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                script: Arc::new(Mutex::new(script.into_iter().collect())),
                peers: tx,
                attempts: Arc::new(AtomicU32::new(0)),
            },
            rx,
        )
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn push_script(&self, outcome: bool) {
        self.script.lock().await.push_back(outcome);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let accept = self.script.lock().await.pop_front().unwrap_or(false);
        if !accept {
            return Err(TransportError::Connect("refused".into()));
        }
        let (c2s_tx, c2s_rx) = mpsc::unbounded_channel();
        let (s2c_tx, s2c_rx) = mpsc::unbounded_channel();
        let _ = self.peers.send(MemoryPeer {
            from_client: c2s_rx,
            to_client: s2c_tx,
        });
        Ok(Box::new(MemoryTransport {
            outbound: Some(c2s_tx),
            inbound: s2c_rx,
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct MemoryTransport {
    outbound: Option<mpsc::UnboundedSender<String>>,
    inbound: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        match &self.outbound {
            Some(tx) => tx.send(text).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.outbound = None;
        self.inbound.close();
    }
}

// ------------------------------------------------------------
// Store backend
// ------------------------------------------------------------

/// Keeps the document in memory, counts saves, and can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    document: std::sync::Mutex<Option<String>>,
    fail_writes: AtomicBool,
    pub saves: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn saves(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn document(&self) -> Option<String> {
        self.document.lock().unwrap().clone()
    }

    fn check_writable(&self) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<String>, PersistenceError> {
        Ok(self.document())
    }

    async fn save(&self, document: String) -> Result<(), PersistenceError> {
        self.check_writable()?;
        *self.document.lock().unwrap() = Some(document);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        self.check_writable()?;
        *self.document.lock().unwrap() = None;
        Ok(())
    }
}
