//! Top-level state: one `Server` owns the keyspace, blocking registry,
//! pub/sub index, replication state, metrics, and config. The event
//! loop holds this plus the connection table and threads `&mut Server`
//! through dispatch — no locking, no global `RwLock`s (§9 "single-owner
//! state over global locking", superseding the teacher's `SERVER:
//! Lazy<Arc<RwLock<RedisServer>>>` global).

use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::time::Instant;

use crate::blocking::BlockingRegistry;
use crate::config::Config;
use crate::keyspace::Keyspace;
use crate::metrics::Metrics;
use crate::persistence::{LoggingSink, PersistenceSink};
use crate::pubsub::PubSub;
use crate::replication::Replication;

pub struct Server {
    pub keyspace: Keyspace,
    pub blocking: BlockingRegistry,
    pub pubsub: PubSub,
    pub repl: Replication,
    pub metrics: Metrics,
    pub config: Config,
    pub persistence: Box<dyn PersistenceSink>,
    pub start_time: Instant,
    shutdown: AtomicBool,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Server {
            keyspace: Keyspace::new(),
            blocking: BlockingRegistry::new(),
            pubsub: PubSub::new(),
            repl: Replication::new(),
            metrics: Metrics::new(),
            config,
            persistence: Box::new(LoggingSink),
            start_time: Instant::now(),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn role(&self) -> &'static str {
        if self.config.replicaof.is_some() {
            "slave"
        } else {
            "master"
        }
    }

    pub fn shutting_down(&self) -> bool {
        self.shutdown.load(Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Relaxed);
    }
}
