//! Backend client registry.
//!
//! # Responsibilities
//! - Hand out one long-lived client per API surface
//! - Collapse concurrent first-time constructions for a surface into one
//! - Forget failed constructions so a later request can retry
//!
//! # Design Decisions
//! - `DashMap` shards keep different surfaces from contending with each other
//! - A pending construction is a `Shared` future stored in the map; every
//!   caller for that surface awaits a clone of it and sees the same result
//! - Map guards are never held across an await
//! - Entries are never evicted; the map grows with the number of surfaces

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;

use crate::kube::client::{BackendClient, ClientBuildError, ClientFactory};
use crate::kube::uri::ApiSurface;
use crate::observability::metrics;

type BuildResult = Result<Arc<BackendClient>, ClientBuildError>;
type PendingBuild = Shared<BoxFuture<'static, BuildResult>>;

enum Slot {
    Ready(Arc<BackendClient>),
    Pending(PendingBuild),
}

/// Registry of backend clients keyed by API surface.
pub struct ClientRegistry {
    factory: Arc<dyn ClientFactory>,
    slots: DashMap<ApiSurface, Slot>,
}

impl ClientRegistry {
    /// Create an empty registry backed by `factory`.
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            slots: DashMap::new(),
        }
    }

    /// Return the client for `surface`, constructing it on first use.
    pub async fn get_or_create(&self, surface: &ApiSurface) -> BuildResult {
        if let Some(slot) = self.slots.get(surface) {
            if let Slot::Ready(client) = slot.value() {
                return Ok(Arc::clone(client));
            }
        }

        let pending = match self.slots.entry(surface.clone()) {
            Entry::Occupied(entry) => match entry.get() {
                Slot::Ready(client) => return Ok(Arc::clone(client)),
                Slot::Pending(build) => build.clone(),
            },
            Entry::Vacant(entry) => {
                let build = self.start_build(surface.clone());
                entry.insert(Slot::Pending(build.clone()));
                build
            }
        };

        let result = pending.clone().await;
        self.settle(surface, &pending, &result);
        result
    }

    /// Number of surfaces with a ready or pending client.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn start_build(&self, surface: ApiSurface) -> PendingBuild {
        let factory = Arc::clone(&self.factory);

        async move {
            match factory.build(&surface).await {
                Ok(client) => {
                    tracing::info!(
                        group = %surface.group,
                        version = %surface.version,
                        base_url = %client.base_url(),
                        "Backend client created"
                    );
                    metrics::record_client_created(&surface.group, &surface.version);
                    Ok(Arc::new(client))
                }
                Err(e) => {
                    tracing::warn!(
                        group = %surface.group,
                        version = %surface.version,
                        error = %e,
                        "Backend client construction failed"
                    );
                    Err(e)
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Replace the pending slot with the outcome of its construction.
    /// Only the slot holding this exact construction is touched.
    fn settle(&self, surface: &ApiSurface, pending: &PendingBuild, result: &BuildResult) {
        match result {
            Ok(client) => {
                if let Some(mut slot) = self.slots.get_mut(surface) {
                    let same = matches!(&*slot, Slot::Pending(build) if build.ptr_eq(pending));
                    if same {
                        *slot = Slot::Ready(Arc::clone(client));
                    }
                }
            }
            Err(_) => {
                let _ = self.slots.remove_if(surface, |_, slot| {
                    matches!(slot, Slot::Pending(build) if build.ptr_eq(pending))
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kube::settings::{ConnectionSettings, Credentials};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn test_settings() -> ConnectionSettings {
        ConnectionSettings {
            host: url::Url::parse("http://127.0.0.1:1").unwrap(),
            credentials: Credentials::None,
            ca_pem: None,
            client_identity: None,
            insecure_skip_tls_verify: false,
        }
    }

    /// Counts constructions; fails the first `failures` calls.
    struct CountingFactory {
        calls: AtomicUsize,
        failures: usize,
        delay: Duration,
    }

    impl CountingFactory {
        fn new(failures: usize, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures,
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ClientFactory for CountingFactory {
        async fn build(&self, surface: &ApiSurface) -> Result<BackendClient, ClientBuildError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if call < self.failures {
                return Err(ClientBuildError::Settings(format!("attempt {} failed", call)));
            }
            BackendClient::new(surface.clone(), &test_settings())
        }
    }

    #[tokio::test]
    async fn test_same_instance_per_surface() {
        let factory = CountingFactory::new(0, Duration::ZERO);
        let registry = ClientRegistry::new(factory.clone());
        let surface = ApiSurface::new("apps", "v1");

        let first = registry.get_or_create(&surface).await.unwrap();
        let second = registry.get_or_create(&surface).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.calls(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_surfaces_get_distinct_clients() {
        let factory = CountingFactory::new(0, Duration::ZERO);
        let registry = ClientRegistry::new(factory.clone());

        let apps = registry.get_or_create(&ApiSurface::new("apps", "v1")).await.unwrap();
        let core = registry.get_or_create(&ApiSurface::new("core", "v1")).await.unwrap();

        assert!(!Arc::ptr_eq(&apps, &core));
        assert_eq!(apps.surface(), &ApiSurface::new("apps", "v1"));
        assert_eq!(factory.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_constructs_once() {
        let factory = CountingFactory::new(0, Duration::from_millis(50));
        let registry = Arc::new(ClientRegistry::new(factory.clone()));
        let surface = ApiSurface::new("batch", "v1");

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = Arc::clone(&registry);
            let surface = surface.clone();
            tasks.push(tokio::spawn(async move {
                registry.get_or_create(&surface).await
            }));
        }

        let mut clients = Vec::new();
        for task in tasks {
            clients.push(task.await.unwrap().unwrap());
        }

        assert_eq!(factory.calls(), 1);
        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_failure() {
        let factory = CountingFactory::new(usize::MAX, Duration::from_millis(200));
        let registry = Arc::new(ClientRegistry::new(factory.clone()));
        let surface = ApiSurface::new("apps", "v1");

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            let surface = surface.clone();
            tasks.push(tokio::spawn(async move {
                registry.get_or_create(&surface).await
            }));
        }

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert_eq!(err, ClientBuildError::Settings("attempt 0 failed".into()));
        }
        assert_eq!(factory.calls(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let factory = CountingFactory::new(1, Duration::ZERO);
        let registry = ClientRegistry::new(factory.clone());
        let surface = ApiSurface::new("apps", "v1");

        assert!(registry.get_or_create(&surface).await.is_err());
        assert!(registry.is_empty());

        assert!(registry.get_or_create(&surface).await.is_ok());
        assert_eq!(factory.calls(), 2);
    }

    /// Holds construction of the `slow` group until released.
    struct GatedFactory {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl ClientFactory for GatedFactory {
        async fn build(&self, surface: &ApiSurface) -> Result<BackendClient, ClientBuildError> {
            if surface.group == "slow" {
                self.gate.notified().await;
            }
            BackendClient::new(surface.clone(), &test_settings())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pending_surface_does_not_block_others() {
        let gate = Arc::new(Notify::new());
        let registry = Arc::new(ClientRegistry::new(Arc::new(GatedFactory {
            gate: Arc::clone(&gate),
        })));

        let slow_registry = Arc::clone(&registry);
        let slow = tokio::spawn(async move {
            slow_registry.get_or_create(&ApiSurface::new("slow", "v1")).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let fast = tokio::time::timeout(
            Duration::from_secs(1),
            registry.get_or_create(&ApiSurface::new("fast", "v1")),
        )
        .await
        .expect("fast surface blocked behind pending construction");
        assert!(fast.is_ok());

        gate.notify_one();
        assert!(slow.await.unwrap().is_ok());
    }
}
