//! Kubernetes pod watch feeding the [`Hook`].
//!
//! The runtime watcher only delivers the latest state of each pod, so this
//! module keeps the last snapshot per pod, the way an informer store does,
//! and turns watch events into create, update and delete notifications.
//!
//! # How It Works
//!
//! 1. Watches `Pod` resources, optionally restricted to a namespace and label selector
//! 2. An applied pod that was not seen before becomes an `ADD` notification
//! 3. An applied pod that was seen before becomes an `UPDATE` notification
//!    carrying `[current, previous]`
//! 4. A deleted pod becomes a `DEL` notification
//! 5. After a relist, pods that disappeared while disconnected become `DEL`
//!    notifications
//!
//! # Example
//!
//! ```ignore
//! use k8s_endpoint_hook::{Hook, Reporter, ReporterConfig, WatchConfig, watch};
//!
//! let reporter = Reporter::new(ReporterConfig::new("http://registry:8081/hook"))?;
//! let config = WatchConfig::new().namespace("shop").label_selector("app=web");
//!
//! watch(config, Hook::new(reporter)).await?;
//! ```

use std::collections::{HashMap, HashSet};

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Config as WatcherConfig, Event};
use kube::{Api, Client, ResourceExt};
use tokio::task::JoinHandle;

use crate::hook::Hook;
use crate::pod::EventKind;

/// Error type for watch failures.
type Error = Box<dyn std::error::Error + Send + Sync>;

/// Result type for watch operations.
type Result<T> = std::result::Result<T, Error>;

/// Configuration for the Kubernetes pod watch.
#[derive(Clone, Debug, Default)]
pub struct WatchConfig {
    /// The namespace to watch. If `None`, pods in all namespaces are watched.
    pub namespace: Option<String>,

    /// Optional label selector restricting the watched pods.
    pub label_selector: Option<String>,
}

impl WatchConfig {
    /// Creates a configuration watching every pod in the cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the watch to one namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Restricts the watch to pods matching a label selector.
    #[must_use]
    pub fn label_selector(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }
}

/// Starts watching pods and feeds every notification to `hook`.
///
/// This function spawns a background task. Failing to build the Kubernetes
/// client is logged and ends the task; watch errors and failures of
/// individual notifications are logged and never stop the watch.
///
/// # Requirements
///
/// - The application must have RBAC permissions to list and watch `Pod` resources
/// - Kubernetes client configuration (in-cluster or kubeconfig)
/// - A running tokio runtime
pub fn watch(config: WatchConfig, hook: Hook) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = watch_loop(config, hook).await {
            tracing::error!("Kubernetes pod watcher failed: {e}");
        }
    })
}

/// Background task that watches pods and dispatches notifications.
async fn watch_loop(config: WatchConfig, hook: Hook) -> Result<()> {
    let client = Client::try_default().await?;
    let pods: Api<Pod> = match &config.namespace {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    };

    let mut watcher_config = WatcherConfig::default();
    if let Some(selector) = &config.label_selector {
        watcher_config = watcher_config.labels(selector);
    }

    tracing::debug!(
        "Starting Kubernetes pod watch in {} with selector {:?}",
        config.namespace.as_deref().unwrap_or("all namespaces"),
        config.label_selector
    );

    let stream = watcher::watcher(pods, watcher_config).default_backoff();
    dispatch(stream, |notification| {
        hook.handle(notification.kind, &notification.pods);
    })
    .await;

    Ok(())
}

/// Feeds watch events to `handle` until the stream ends.
///
/// Watcher errors are logged and skipped; the backoff wrapping the stream
/// spaces out the retries. The pod cache survives them.
async fn dispatch<S, E, F>(stream: S, mut handle: F)
where
    S: Stream<Item = std::result::Result<Event<Pod>, E>>,
    E: std::fmt::Display,
    F: FnMut(Notification),
{
    let mut cache = PodCache::default();
    tokio::pin!(stream);

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Kubernetes pod watch error, retrying: {e}");
                continue;
            }
        };

        for notification in process_event(event, &mut cache) {
            handle(notification);
        }
    }
}

/// A lifecycle notification: `[current]` or `[current, previous]`.
#[derive(Debug, Clone, PartialEq)]
struct Notification {
    kind: EventKind,
    pods: Vec<Pod>,
}

impl Notification {
    fn new(kind: EventKind, pods: Vec<Pod>) -> Self {
        Self { kind, pods }
    }
}

/// Identity of a pod: namespace and name.
type PodKey = (String, String);

fn pod_key(pod: &Pod) -> PodKey {
    (pod.namespace().unwrap_or_default(), pod.name_any())
}

/// Last observed snapshot of every watched pod.
#[derive(Debug, Default)]
struct PodCache {
    pods: HashMap<PodKey, Pod>,
    /// Keys seen since the last `Init`, while a relist is in progress.
    relisted: Option<HashSet<PodKey>>,
}

impl PodCache {
    fn apply(&mut self, pod: Pod) -> Notification {
        match self.pods.insert(pod_key(&pod), pod.clone()) {
            Some(previous) => Notification::new(EventKind::Update, vec![pod, previous]),
            None => Notification::new(EventKind::Add, vec![pod]),
        }
    }

    fn delete(&mut self, pod: Pod) -> Notification {
        self.pods.remove(&pod_key(&pod));
        Notification::new(EventKind::Del, vec![pod])
    }

    /// Forgets pods missing from the relist that just completed.
    fn finish_relist(&mut self) -> Vec<Notification> {
        let Some(seen) = self.relisted.take() else {
            return Vec::new();
        };

        let gone: Vec<PodKey> = self
            .pods
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();

        gone.into_iter()
            .filter_map(|key| self.pods.remove(&key))
            .map(|pod| {
                tracing::debug!("pod {} vanished during relist", pod.name_any());
                Notification::new(EventKind::Del, vec![pod])
            })
            .collect()
    }
}

/// Processes a watcher event and returns the resulting notifications.
///
/// This function is extracted to enable unit testing of the event processing logic.
fn process_event(event: Event<Pod>, cache: &mut PodCache) -> Vec<Notification> {
    match event {
        Event::Apply(pod) => vec![cache.apply(pod)],

        Event::InitApply(pod) => {
            if let Some(seen) = cache.relisted.as_mut() {
                seen.insert(pod_key(&pod));
            }

            vec![cache.apply(pod)]
        }

        Event::Delete(pod) => vec![cache.delete(pod)],

        Event::Init => {
            tracing::debug!("Kubernetes watcher relist started");
            cache.relisted = Some(HashSet::new());
            Vec::new()
        }

        Event::InitDone => {
            tracing::debug!("Kubernetes watcher relist done, {} pods known", cache.pods.len());
            cache.finish_relist()
        }
    }
}
