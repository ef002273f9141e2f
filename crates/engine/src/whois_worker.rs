use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nodewatch_application::ports::{Clock, StorageGateway, WhoisLookup, WhoisService};
use nodewatch_domain::WhoisOutcome;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// TTL gating re-enqueue of an already-looked-up domain, per §4.8.
const DEFAULT_TTL: Duration = Duration::from_secs(24 * 3600);

/// Single background consumer for WHOIS lookups, decoupled from the test
/// path. `Enqueue` is non-blocking and safe to call concurrently with
/// `Stop`; it never panics and never backpressures the caller.
pub struct WhoisWorker {
    service: Arc<dyn WhoisService>,
    storage: Arc<dyn StorageGateway>,
    clock: Arc<dyn Clock>,
    sender: Mutex<Option<mpsc::Sender<String>>>,
    receiver: Mutex<Option<mpsc::Receiver<String>>>,
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
    ttl: Duration,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl WhoisWorker {
    pub fn new(
        service: Arc<dyn WhoisService>,
        storage: Arc<dyn StorageGateway>,
        clock: Arc<dyn Clock>,
        capacity: usize,
    ) -> Arc<Self> {
        Self::with_ttl(service, storage, clock, capacity, DEFAULT_TTL)
    }

    pub fn with_ttl(
        service: Arc<dyn WhoisService>,
        storage: Arc<dyn StorageGateway>,
        clock: Arc<dyn Clock>,
        capacity: usize,
        ttl: Duration,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Arc::new(Self {
            service,
            storage,
            clock,
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            seen: Mutex::new(HashMap::new()),
            ttl,
            handle: tokio::sync::Mutex::new(None),
        })
    }

    /// Drops `domain` silently if the queue is stopped, the domain was
    /// successfully looked up within the TTL, or the channel is full. A
    /// dropped-for-fullness domain is not marked seen, so it can be retried.
    pub fn enqueue(&self, domain: String) {
        if domain.is_empty() {
            return;
        }

        {
            let seen = self.seen.lock().expect("whois seen map poisoned");
            if let Some(&last) = seen.get(&domain) {
                let elapsed = self.clock.now() - last;
                if elapsed < chrono_ttl(self.ttl) {
                    return;
                }
            }
        }

        let sender = self.sender.lock().expect("whois sender mutex poisoned").clone();
        let Some(sender) = sender else { return };

        if sender.try_send(domain.clone()).is_err() {
            debug!(domain, "whois queue full or closed, dropping lookup");
        }
    }

    pub async fn start(self: Arc<Self>, cancellation: CancellationToken) {
        let mut handle_guard = self.handle.lock().await;
        if handle_guard.is_some() {
            return;
        }

        let Some(receiver) = self.receiver.lock().expect("whois receiver mutex poisoned").take()
        else {
            return;
        };

        let worker = self.clone();
        let join = tokio::spawn(async move { worker.run(receiver, cancellation).await });
        *handle_guard = Some(join);
    }

    pub async fn stop(&self) {
        self.sender.lock().expect("whois sender mutex poisoned").take();

        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn run(&self, mut receiver: mpsc::Receiver<String>, cancellation: CancellationToken) {
        let mut housekeeping = tokio::time::interval(Duration::from_secs(3600));
        housekeeping.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                domain = receiver.recv() => {
                    let Some(domain) = domain else { break };
                    self.process(domain).await;
                }
                _ = housekeeping.tick() => self.prune_seen(),
            }
        }
    }

    async fn process(&self, domain: String) {
        match self.service.lookup(&domain).await {
            Ok(WhoisLookup::NotFound) => {
                let outcome = WhoisOutcome {
                    domain: domain.clone(),
                    looked_up_at: self.clock.now(),
                    registered: false,
                    registrar: None,
                    expiration: None,
                };
                self.persist(&outcome).await;
                self.mark_seen(domain);
            }
            Ok(WhoisLookup::Found {
                registrar,
                expiration,
            }) => {
                let complete = expiration.is_some();
                let outcome = WhoisOutcome {
                    domain: domain.clone(),
                    looked_up_at: self.clock.now(),
                    registered: true,
                    registrar,
                    expiration,
                };
                if complete {
                    self.persist(&outcome).await;
                }
                self.mark_seen(domain);
            }
            Err(err) => {
                debug!(%err, domain, "transient whois failure, will retry later");
            }
        }
    }

    async fn persist(&self, outcome: &WhoisOutcome) {
        if let Err(err) = self.storage.store_whois_result(outcome).await {
            warn!(%err, domain = %outcome.domain, "failed to persist whois result");
        }
    }

    fn mark_seen(&self, domain: String) {
        let now = self.clock.now();
        self.seen
            .lock()
            .expect("whois seen map poisoned")
            .insert(domain, now);
    }

    fn prune_seen(&self) {
        let now = self.clock.now();
        let ttl = chrono_ttl(self.ttl);
        self.seen
            .lock()
            .expect("whois seen map poisoned")
            .retain(|_, last| now - *last < ttl);
    }
}

fn chrono_ttl(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
}
