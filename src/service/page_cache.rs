use crate::error::AuditError;
use crate::types::pagespeed::{PageSpeedReport, Strategy};

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub type CacheKey = (String, Strategy);

/// TTL-keyed lookup table with a hard entry cap; the oldest entry goes first.
#[derive(Debug)]
pub struct TtlMap<V> {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<CacheKey, (Instant, V)>,
}

impl<V: Clone> TtlMap<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &CacheKey, now: Instant) -> Option<V> {
        let fresh = self
            .entries
            .get(key)
            .is_some_and(|(stored, _)| now.duration_since(*stored) < self.ttl);
        if !fresh {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|(_, v)| v.clone())
    }

    pub fn insert(&mut self, key: CacheKey, value: V, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (stored, _)| now.duration_since(*stored) < ttl);
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (stored, _))| *stored)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, (now, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
pub enum PageCacheMessage {
    Get(CacheKey, RpcReplyPort<Option<PageSpeedReport>>),
    Put(CacheKey, Box<PageSpeedReport>),
}

/// Handle for the page-speed result cache actor.
#[derive(Clone)]
pub struct PageCacheHandle {
    actor: ActorRef<PageCacheMessage>,
}

impl PageCacheHandle {
    pub async fn get(&self, url: &str, strategy: Strategy) -> Option<PageSpeedReport> {
        ractor::call!(
            self.actor,
            PageCacheMessage::Get,
            (url.to_string(), strategy)
        )
        .inspect_err(|e| debug!("page cache lookup failed: {e}"))
        .ok()
        .flatten()
    }

    pub fn put(&self, report: PageSpeedReport) {
        let key = (report.url.clone(), report.strategy);
        let _ = ractor::cast!(self.actor, PageCacheMessage::Put(key, Box::new(report)));
    }
}

struct PageCacheActor;

#[ractor::async_trait]
impl Actor for PageCacheActor {
    type Msg = PageCacheMessage;
    type State = TtlMap<PageSpeedReport>;
    type Arguments = (Duration, usize);

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        (ttl, capacity): Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(
            ttl_secs = ttl.as_secs(),
            capacity, "PageSpeed cache actor started"
        );
        Ok(TtlMap::new(ttl, capacity))
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            PageCacheMessage::Get(key, reply) => {
                let hit = state.get(&key, Instant::now());
                debug!(url = %key.0, strategy = %key.1, hit = hit.is_some(), "page cache lookup");
                let _ = reply.send(hit);
            }
            PageCacheMessage::Put(key, report) => {
                state.insert(key, *report, Instant::now());
            }
        }
        Ok(())
    }
}

/// Spawn an unnamed cache actor so several routers can coexist in one process.
pub async fn spawn(ttl: Duration, capacity: usize) -> Result<PageCacheHandle, AuditError> {
    let (actor, _jh) = Actor::spawn(None, PageCacheActor, (ttl, capacity))
        .await
        .map_err(|e| AuditError::RactorError(format!("spawn page cache failed: {e}")))?;
    Ok(PageCacheHandle { actor })
}
