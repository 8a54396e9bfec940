//! Process-scoped directory of named machines.
//!
//! A machine registered under a name can be observed by any other machine
//! holding the same [`Registry`], without either knowing the other's data
//! type. The directory lives in a `watch` channel and every mutation
//! publishes a whole new map, so lookups never see a half-applied change.
//!
//! Entries are removed automatically when the registered stream closes or
//! the owner's destroy token fires. Removal is keyed by entry id, so a stale
//! watcher can never evict a newer machine that reused the name.

mod peer;

pub use peer::{LookupTimeout, PeerState, PeerStream};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

/// Registry settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Quiet period a pending lookup waits for after a directory change.
    /// Every further change within the window restarts it.
    pub debounce_ms: u64,
}

impl RegistryConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// One registered machine.
#[derive(Clone, Debug)]
pub struct RegistryEntry {
    pub id: Uuid,
    pub stream: PeerStream,
}

type Directory = Arc<BTreeMap<String, RegistryEntry>>;

/// Name to peer-stream directory. Cloning shares the directory.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    directory: watch::Sender<Directory>,
    config: RegistryConfig,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let (directory, _) = watch::channel(Directory::default());
        Self {
            inner: Arc::new(RegistryInner { directory, config }),
        }
    }

    /// The registry shared by the whole process.
    pub fn shared() -> Self {
        static SHARED: OnceLock<Registry> = OnceLock::new();
        SHARED.get_or_init(Registry::new).clone()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Publish `stream` under `name`.
    ///
    /// Returns `false`, leaving the existing entry untouched, when the name
    /// is taken. The entry is removed once `stream` closes or `destroy`
    /// fires. Must be called from within a tokio runtime.
    pub fn register(&self, name: &str, stream: PeerStream, destroy: &CancellationToken) -> bool {
        let id = Uuid::new_v4();
        let entry = RegistryEntry {
            id,
            stream: stream.clone(),
        };

        let inserted = self.inner.directory.send_if_modified(|directory| {
            if directory.contains_key(name) {
                return false;
            }
            let mut next = directory.as_ref().clone();
            next.insert(name.to_string(), entry);
            *directory = Arc::new(next);
            true
        });

        if !inserted {
            error!(
                name,
                "A machine with this name is already registered and cannot be added"
            );
            return false;
        }
        debug!(name, entry = %id, "Machine registered");

        let registry = Arc::downgrade(&self.inner);
        let destroy = destroy.clone();
        let name = name.to_string();
        let mut stream = stream;
        tokio::spawn(async move {
            tokio::select! {
                _ = destroy.cancelled() => {}
                _ = async { while stream.changed().await.is_ok() {} } => {}
            }
            remove_entry(&registry, &name, id);
        });

        true
    }

    /// Stream of the machine registered under `name`, if present right now.
    pub fn get(&self, name: &str) -> Option<PeerStream> {
        stream_of(&self.inner.directory.borrow(), name)
    }

    /// Wait for `name` to be registered.
    ///
    /// Resolves to `None` when `timeout` elapses or `destroy` fires first.
    pub async fn lookup(
        &self,
        name: &str,
        destroy: &CancellationToken,
        timeout: LookupTimeout,
    ) -> Option<PeerStream> {
        if destroy.is_cancelled() {
            return None;
        }

        let mut directory = self.inner.directory.subscribe();
        let present = stream_of(&directory.borrow_and_update(), name);
        if present.is_some() {
            return present;
        }

        let wait = self.wait_for(name, &mut directory);
        let found = match timeout {
            LookupTimeout::Never => tokio::select! {
                biased;
                _ = destroy.cancelled() => None,
                found = wait => found,
            },
            LookupTimeout::After(limit) => tokio::select! {
                biased;
                _ = destroy.cancelled() => None,
                found = tokio::time::timeout(limit, wait) => found.ok().flatten(),
            },
        };

        if found.is_none() {
            debug!(name, ?timeout, "Peer lookup gave up");
        }
        found
    }

    async fn wait_for(
        &self,
        name: &str,
        directory: &mut watch::Receiver<Directory>,
    ) -> Option<PeerStream> {
        let debounce = self.inner.config.debounce();
        loop {
            directory.changed().await.ok()?;
            if !debounce.is_zero() {
                // Wait for a full quiet window; a burst of changes is
                // evaluated once.
                loop {
                    tokio::time::sleep(debounce).await;
                    if !directory.has_changed().unwrap_or(false) {
                        break;
                    }
                    directory.borrow_and_update();
                }
            }
            let found = stream_of(&directory.borrow_and_update(), name);
            if found.is_some() {
                return found;
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.directory.borrow().contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.inner.directory.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.directory.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.directory.borrow().is_empty()
    }
}

fn stream_of(directory: &Directory, name: &str) -> Option<PeerStream> {
    directory.get(name).map(|entry| entry.stream.clone())
}

fn remove_entry(registry: &Weak<RegistryInner>, name: &str, id: Uuid) {
    let Some(inner) = registry.upgrade() else {
        return;
    };
    let removed = inner.directory.send_if_modified(|directory| {
        match directory.get(name) {
            Some(entry) if entry.id == id => {
                let mut next = directory.as_ref().clone();
                next.remove(name);
                *directory = Arc::new(next);
                true
            }
            _ => false,
        }
    });
    if removed {
        debug!(name, entry = %id, "Machine unregistered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Let spawned watchers run; the paused clock only advances once every
    /// task is idle.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn peer(state: &str) -> (watch::Sender<PeerState>, PeerStream) {
        watch::channel(PeerState::Active {
            state: state.to_string(),
            data: serde_json::json!({ "state": state }),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn collision_keeps_original_entry() {
        let registry = Registry::new();
        let token = CancellationToken::new();
        let (_a, first) = peer("go");
        let (_b, second) = peer("stop");

        assert!(registry.register("light", first, &token));
        assert!(!registry.register("light", second, &token));

        let found = registry.get("light").unwrap();
        assert!(found.borrow().is_in("go"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_fails_fast_for_missing_name() {
        let registry = Registry::new();
        let token = CancellationToken::new();

        let found = registry
            .lookup("missing", &token, LookupTimeout::After(Duration::ZERO))
            .await;
        assert!(found.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_finds_present_name() {
        let registry = Registry::new();
        let token = CancellationToken::new();
        let (_tx, stream) = peer("go");
        registry.register("light", stream, &token);

        let found = registry
            .lookup("light", &token, LookupTimeout::default())
            .await;
        assert!(found.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn entry_removed_when_stream_closes() {
        let registry = Registry::new();
        let token = CancellationToken::new();
        let (tx, stream) = peer("go");
        registry.register("light", stream, &token);

        drop(tx);
        settle().await;
        assert!(!registry.contains("light"));
    }

    #[tokio::test(start_paused = true)]
    async fn entry_removed_when_destroy_fires() {
        let registry = Registry::new();
        let token = CancellationToken::new();
        let (_tx, stream) = peer("go");
        registry.register("light", stream, &token);

        token.cancel();
        settle().await;
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn name_is_reusable_after_removal() {
        let registry = Registry::new();
        let old_token = CancellationToken::new();
        let new_token = CancellationToken::new();
        let (old_tx, old_stream) = peer("go");
        let (_new_tx, new_stream) = peer("stop");

        registry.register("light", old_stream, &old_token);
        old_token.cancel();
        settle().await;
        assert!(registry.register("light", new_stream, &new_token));

        drop(old_tx);
        settle().await;
        assert!(registry.get("light").unwrap().borrow().is_in("stop"));
    }

    #[tokio::test(start_paused = true)]
    async fn never_timeout_waits_for_registration() {
        let registry = Registry::with_config(RegistryConfig { debounce_ms: 5 });
        let token = CancellationToken::new();

        let waiter = {
            let registry = registry.clone();
            let token = token.clone();
            tokio::spawn(async move {
                registry
                    .lookup("late", &token, LookupTimeout::Never)
                    .await
                    .is_some()
            })
        };

        tokio::time::sleep(Duration::from_secs(60)).await;
        let (_tx, stream) = peer("go");
        registry.register("late", stream, &token);

        assert!(waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_waits_for_directory_to_go_quiet() {
        let registry = Registry::with_config(RegistryConfig { debounce_ms: 10 });
        let token = CancellationToken::new();

        let waiter = {
            let registry = registry.clone();
            let token = token.clone();
            tokio::spawn(async move {
                registry
                    .lookup("late", &token, LookupTimeout::Never)
                    .await
                    .is_some()
            })
        };
        settle().await;

        let (_late_tx, late) = peer("go");
        registry.register("late", late, &token);
        let mut churn = Vec::new();
        for i in 0..6 {
            tokio::time::sleep(Duration::from_millis(4)).await;
            let (tx, stream) = peer("stop");
            registry.register(&format!("churn{i}"), stream, &token);
            churn.push(tx);
            assert!(!waiter.is_finished());
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(waiter.is_finished());
        assert!(waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_resolves_pending_lookup() {
        let registry = Registry::new();
        let token = CancellationToken::new();

        let waiter = {
            let registry = registry.clone();
            let token = token.clone();
            tokio::spawn(async move { registry.lookup("absent", &token, LookupTimeout::Never).await })
        };

        tokio::task::yield_now().await;
        token.cancel();
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_elapses_to_none() {
        let registry = Registry::new();
        let token = CancellationToken::new();

        let found = registry
            .lookup("absent", &token, LookupTimeout::from_millis(100))
            .await;
        assert!(found.is_none());
    }

    #[test]
    fn config_deserializes_camel_case() {
        let config: RegistryConfig = serde_json::from_str(r#"{ "debounceMs": 20 }"#).unwrap();
        assert_eq!(config.debounce(), Duration::from_millis(20));
    }
}
