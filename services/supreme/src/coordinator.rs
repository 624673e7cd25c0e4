//! Request routing across watcher nodes.
//!
//! Every request ID moves through `Issued -> Dispatched -> Bound(node) ->
//! Released`. Issuing is synchronous: the caller gets its reset token before
//! any node has been contacted. Placement runs in a background task that
//! tries the node the function was last seen on, then broadcasts to every
//! node in order, a bounded number of times.
//!
//! Each live ID owns a `watch` channel carrying its [`Binding`]. A reset that
//! arrives before placement finished waits on that channel instead of
//! polling the catalog.
//!
//! The catalogs sit behind one lock that is never held across an RPC.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use seqclock_request::{Request, RequestError, ResetRequest};
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::client::WatcherNode;
use crate::error::CoordinatorError;

/// Placement state of one request ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Issued, placement still running.
    Pending,
    /// Granted by the node at this index.
    Bound(usize),
    /// No node took the request within the dispatch policy.
    Failed,
}

/// Retry policy for the placement broadcast.
#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    /// Broadcast rounds before giving up.
    pub max_attempts: u32,
    /// Pause between rounds.
    pub backoff: Duration,
    /// How long a failed placement stays visible to resets before it is
    /// dropped from the catalog.
    pub failed_ttl: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            backoff: Duration::from_millis(50),
            failed_ttl: Duration::from_secs(60),
        }
    }
}

/// Outcome of a placement broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Bound(usize),
    /// Every round came back negative.
    Exhausted { attempts: u32 },
    /// Shutdown interrupted the retries.
    Stopped { attempts: u32 },
}

struct RequestEntry {
    function: String,
    binding: watch::Sender<Binding>,
    releasing: bool,
}

#[derive(Default)]
struct Catalogs {
    /// Live request ID to its placement.
    requests: HashMap<u64, RequestEntry>,
    /// Sticky function to node affinity.
    functions: HashMap<String, usize>,
}

/// Serializable view of the catalogs for debugging.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSnapshot {
    pub taken_at: DateTime<Utc>,
    /// Request ID to node name, `pending` or `failed`.
    pub requests: BTreeMap<u64, String>,
    /// Function to node name.
    pub functions: BTreeMap<String, String>,
}

/// Cluster-wide coordinator.
///
/// Cheap to clone; clones share the same catalogs.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    nodes: Vec<Arc<dyn WatcherNode>>,
    counter: AtomicU64,
    catalogs: RwLock<Catalogs>,
    policy: DispatchPolicy,
    shutdown_tx: watch::Sender<bool>,
    /// Release tasks accepted but not yet finished.
    releases: watch::Sender<usize>,
}

impl Coordinator {
    pub fn new(nodes: Vec<Arc<dyn WatcherNode>>, policy: DispatchPolicy) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (releases, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                nodes,
                counter: AtomicU64::new(0),
                catalogs: RwLock::new(Catalogs::default()),
                policy,
                shutdown_tx,
                releases,
            }),
        }
    }

    pub fn node_count(&self) -> usize {
        self.inner.nodes.len()
    }

    /// Issue an ID for `request` and start placing it in the background.
    pub async fn request_resources(
        &self,
        mut request: Request,
    ) -> Result<ResetRequest, CoordinatorError> {
        request.validate()?;
        if self.inner.nodes.is_empty() {
            return Err(CoordinatorError::Unavailable(
                "no watcher nodes configured".to_string(),
            ));
        }
        if *self.inner.shutdown_tx.borrow() {
            return Err(CoordinatorError::Unavailable(
                "coordinator is shutting down".to_string(),
            ));
        }

        request.id = self.inner.counter.fetch_add(1, Ordering::SeqCst);
        let reset = ResetRequest::for_request(&request);

        let (binding, _) = watch::channel(Binding::Pending);
        self.inner.catalogs.write().await.requests.insert(
            request.id,
            RequestEntry {
                function: request.function.clone(),
                binding,
                releasing: false,
            },
        );
        debug!(request_id = request.id, function = %request.function, "Request issued");

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.dispatch(request).await;
        });

        Ok(reset)
    }

    /// Release the grant behind `reset` once its placement is known.
    pub async fn reset_resources(&self, reset: ResetRequest) -> Result<(), CoordinatorError> {
        reset.validate()?;

        let receiver = {
            let mut catalogs = self.inner.catalogs.write().await;
            let entry = match catalogs.requests.get_mut(&reset.id) {
                Some(entry) if !entry.releasing => entry,
                _ => return Err(CoordinatorError::NotFound(reset.id)),
            };
            if entry.function != reset.function {
                return Err(RequestError::FunctionMismatch {
                    id: reset.id,
                    expected: entry.function.clone(),
                    actual: reset.function,
                }
                .into());
            }
            if *entry.binding.borrow() == Binding::Failed {
                catalogs.requests.remove(&reset.id);
                return Err(CoordinatorError::Unavailable(format!(
                    "request {} was never placed on a node",
                    reset.id
                )));
            }
            entry.releasing = true;
            self.inner.releases.send_modify(|n| *n += 1);
            entry.binding.subscribe()
        };

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.release(reset, receiver).await;
        });
        Ok(())
    }

    /// Current placement of a live request.
    pub async fn binding(&self, id: u64) -> Option<Binding> {
        self.inner
            .catalogs
            .read()
            .await
            .requests
            .get(&id)
            .map(|entry| *entry.binding.borrow())
    }

    pub async fn catalogs(&self) -> CatalogSnapshot {
        let catalogs = self.inner.catalogs.read().await;
        let requests = catalogs
            .requests
            .iter()
            .map(|(&id, entry)| {
                let placement = match *entry.binding.borrow() {
                    Binding::Pending => "pending".to_string(),
                    Binding::Bound(idx) => self.node_name(idx),
                    Binding::Failed => "failed".to_string(),
                };
                (id, placement)
            })
            .collect();
        let functions = catalogs
            .functions
            .iter()
            .map(|(function, &idx)| (function.clone(), self.node_name(idx)))
            .collect();
        CatalogSnapshot {
            taken_at: Utc::now(),
            requests,
            functions,
        }
    }

    /// Stop placing requests. Placements in progress end as failed.
    pub fn shutdown(&self) {
        self.inner.shutdown_tx.send_replace(true);
    }

    /// Wait until every accepted reset has been delivered (or given up on).
    pub async fn drain(&self) {
        let mut releases = self.inner.releases.subscribe();
        let _ = releases.wait_for(|n| *n == 0).await;
    }

    async fn dispatch(&self, request: Request) {
        let cached = self
            .inner
            .catalogs
            .read()
            .await
            .functions
            .get(&request.function)
            .copied();

        if let Some(idx) = cached {
            match self.inner.nodes[idx].send_request(&request).await {
                Ok(true) => {
                    self.bind(&request, idx, false).await;
                    return;
                }
                Ok(false) => {
                    debug!(
                        request_id = request.id,
                        function = %request.function,
                        node = %self.node_name(idx),
                        "Cached node no longer hosts function"
                    );
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        request_id = request.id,
                        node = %self.node_name(idx),
                        "Cached node request failed"
                    );
                }
            }
        }

        let mut shutdown = self.inner.shutdown_tx.subscribe();
        let (attempts, stopped) = match self.broadcast(&request, &mut shutdown).await {
            Placement::Bound(idx) => {
                self.bind(&request, idx, true).await;
                return;
            }
            Placement::Exhausted { attempts } => (attempts, false),
            Placement::Stopped { attempts } => (attempts, true),
        };

        warn!(
            request_id = request.id,
            function = %request.function,
            attempts,
            stopped_by_shutdown = stopped,
            "Request could not be placed on any node"
        );
        if let Some(entry) = self.inner.catalogs.read().await.requests.get(&request.id) {
            entry.binding.send_replace(Binding::Failed);
        }
        if !stopped {
            self.expire_failed(request.id, &mut shutdown).await;
        }
    }

    /// Ask every node in order, round after round, until one accepts.
    async fn broadcast(
        &self,
        request: &Request,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Placement {
        let policy = self.inner.policy;
        let mut attempts = 0;
        while attempts < policy.max_attempts {
            attempts += 1;
            for (idx, node) in self.inner.nodes.iter().enumerate() {
                match node.send_request(request).await {
                    Ok(true) => return Placement::Bound(idx),
                    Ok(false) => {}
                    Err(e) => {
                        warn!(
                            error = %e,
                            request_id = request.id,
                            node = %node.name(),
                            "Watcher request failed"
                        );
                    }
                }
            }

            if attempts == policy.max_attempts {
                break;
            }
            debug!(
                request_id = request.id,
                function = %request.function,
                attempt = attempts,
                "No node hosts function yet, retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(policy.backoff) => {}
                _ = shutdown.wait_for(|stop| *stop) => return Placement::Stopped { attempts },
            }
        }
        Placement::Exhausted { attempts }
    }

    /// Drop a failed slot nobody reset within the policy's TTL.
    async fn expire_failed(&self, id: u64, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(self.inner.policy.failed_ttl) => {}
            _ = shutdown.wait_for(|stop| *stop) => return,
        }
        let mut catalogs = self.inner.catalogs.write().await;
        let expired = catalogs
            .requests
            .get(&id)
            .is_some_and(|entry| !entry.releasing && *entry.binding.borrow() == Binding::Failed);
        if expired {
            catalogs.requests.remove(&id);
            debug!(request_id = id, "Failed request expired");
        }
    }

    async fn bind(&self, request: &Request, idx: usize, refresh_affinity: bool) {
        let mut catalogs = self.inner.catalogs.write().await;
        if refresh_affinity {
            catalogs.functions.insert(request.function.clone(), idx);
        }
        match catalogs.requests.get(&request.id) {
            Some(entry) => {
                entry.binding.send_replace(Binding::Bound(idx));
                info!(
                    request_id = request.id,
                    function = %request.function,
                    node = %self.node_name(idx),
                    "Request bound"
                );
            }
            None => warn!(request_id = request.id, "Bound request is no longer tracked"),
        }
    }

    async fn release(&self, reset: ResetRequest, mut binding: watch::Receiver<Binding>) {
        let placement = match binding.wait_for(|b| *b != Binding::Pending).await {
            Ok(placement) => *placement,
            Err(_) => Binding::Failed,
        };

        match placement {
            Binding::Bound(idx) => {
                let node = &self.inner.nodes[idx];
                match node.send_reset(&reset).await {
                    Ok(true) => info!(
                        request_id = reset.id,
                        function = %reset.function,
                        node = %node.name(),
                        "Request released"
                    ),
                    Ok(false) => warn!(
                        request_id = reset.id,
                        node = %node.name(),
                        "Problem with watcher: request unknown to node"
                    ),
                    Err(e) => warn!(
                        error = %e,
                        request_id = reset.id,
                        node = %node.name(),
                        "Problem with watcher"
                    ),
                }
            }
            Binding::Pending | Binding::Failed => warn!(
                request_id = reset.id,
                function = %reset.function,
                "Request was never placed, nothing to release"
            ),
        }

        self.inner.catalogs.write().await.requests.remove(&reset.id);
        self.inner.releases.send_modify(|n| *n = n.saturating_sub(1));
    }

    fn node_name(&self, idx: usize) -> String {
        self.inner
            .nodes
            .get(idx)
            .map(|node| node.name().to_string())
            .unwrap_or_else(|| format!("node-{idx}"))
    }
}
