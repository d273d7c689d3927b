//! Detection of reachability transitions from `(current, previous)` pod snapshots.
//!
//! Only update notifications are considered. Bare create and delete
//! notifications race with container startup, while the before/after pair of
//! an update tells exactly when a pod got its IP or started terminating.

use std::fmt;

use k8s_openapi::api::core::v1::Pod;

use crate::error::HookError;
use crate::pod::{EventKind, InstanceInfo};

/// Direction of a reachability change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    /// The pod became reachable.
    Add,
    /// The pod became unreachable.
    Del,
}

impl TransitionKind {
    /// Returns the `state` form value sent to the registration endpoint.
    #[must_use]
    pub fn state(self) -> &'static str {
        EventKind::from(self).state()
    }
}

impl From<TransitionKind> for EventKind {
    fn from(kind: TransitionKind) -> Self {
        match kind {
            TransitionKind::Add => Self::Add,
            TransitionKind::Del => Self::Del,
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        EventKind::from(*self).fmt(f)
    }
}

/// A detected reachability change for one pod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Direction of the change.
    pub kind: TransitionKind,
    /// Pod name.
    pub name: String,
    /// Pod namespace.
    pub namespace: String,
    /// Pod IP.
    pub address: String,
    /// Container port as text.
    pub port: String,
    /// Status reason, for diagnostics.
    pub reason: String,
    /// Status message, for diagnostics.
    pub message: String,
}

impl Transition {
    fn new(kind: TransitionKind, info: InstanceInfo) -> Self {
        Self {
            kind,
            name: info.name,
            namespace: info.namespace,
            address: info.address,
            port: info.port,
            reason: info.reason,
            message: info.message,
        }
    }
}

/// Decides whether a notification represents a real reachability change.
///
/// `pods` holds `[current]` for create and delete notifications, and
/// `[current, previous]` for updates. Returns `Ok(None)` when nothing
/// changed, which is the normal outcome for label or annotation churn.
///
/// A terminating pod is reported as [`TransitionKind::Del`] before any
/// address or port comparison. A pod that gained an IP, or whose port
/// changed, is reported as [`TransitionKind::Add`]. Losing the IP is not
/// treated as a removal: the status lags the deletion timestamp by about
/// thirty seconds.
///
/// # Errors
///
/// Returns a [`HookError`] if the batch size is not 1 or 2, if an update
/// lacks its previous snapshot, or if either snapshot fails to parse.
pub fn detect(kind: EventKind, pods: &[Pod]) -> Result<Option<Transition>, HookError> {
    let (current, previous) = match pods {
        [current] => (current, None),
        [current, previous] => (current, Some(previous)),
        _ => return Err(HookError::Arity { len: pods.len() }),
    };

    tracing::debug!(
        "hook meta: {}, ns: {}, status: {}, phase: {kind}, skip: {}",
        current.metadata.name.as_deref().unwrap_or_default(),
        current.metadata.namespace.as_deref().unwrap_or_default(),
        current
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or_default(),
        kind != EventKind::Update
    );

    if kind != EventKind::Update {
        return Ok(None);
    }

    let previous = previous.ok_or(HookError::MissingPrevious)?;
    let current = InstanceInfo::parse(current, kind).map_err(HookError::Current)?;
    let previous = InstanceInfo::parse(previous, kind).map_err(HookError::Previous)?;

    if previous.address != current.address {
        tracing::info!(
            "hook old ip: {}:{}, new ip: {}:{}",
            previous.address,
            previous.port,
            current.address,
            current.port
        );
    }

    let detected = if current.terminating && !previous.terminating {
        tracing::info!("found a delete phase for {}/{}", current.namespace, current.name);
        TransitionKind::Del
    } else if (previous.address.is_empty() && !current.address.is_empty())
        || previous.port != current.port
    {
        tracing::info!("found an add phase for {}/{}", current.namespace, current.name);
        TransitionKind::Add
    } else {
        tracing::debug!("not detected as del or add, skip {}/{}", current.namespace, current.name);
        return Ok(None);
    };

    let transition = Transition::new(detected, current);

    tracing::info!(
        "hook pod {}, ip: {}:{}, transition: {}",
        transition.name,
        transition.address,
        transition.port,
        transition.kind
    );

    if !transition.reason.is_empty() || !transition.message.is_empty() {
        tracing::info!(
            "hook transition: {}, ip: {}:{}, reason: {}, msg: {}",
            transition.kind,
            transition.address,
            transition.port,
            transition.reason,
            transition.message
        );
    }

    Ok(Some(transition))
}
