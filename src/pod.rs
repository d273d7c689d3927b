//! Normalization of raw pod snapshots.
//!
//! Only single-container pods are supported: the first container's first
//! declared port is the service port. Deletion notifications skip the shape
//! checks because the API server may deliver them with a degenerate body.

use std::fmt;

use k8s_openapi::api::core::v1::Pod;

use crate::error::ParseError;

/// The lifecycle notification kind that produced a snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Not a known notification.
    #[default]
    Unknown,
    /// The pod was created.
    Add,
    /// The pod changed; carries the previous snapshot.
    Update,
    /// The pod was deleted.
    Del,
}

impl EventKind {
    /// Returns the desired reachability encoded for the registration endpoint:
    /// `"1"` for up, `"0"` for down.
    #[must_use]
    pub fn state(self) -> &'static str {
        match self {
            Self::Add | Self::Update => "1",
            Self::Del | Self::Unknown => "0",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "ADD",
            Self::Update => "UPDATE",
            Self::Del => "DEL",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// Normalized facts about one pod at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Pod name.
    pub name: String,
    /// Pod namespace; empty when the snapshot carries none.
    pub namespace: String,
    /// Notification kind the snapshot arrived with.
    pub kind: EventKind,
    /// Pod IP, empty while unassigned.
    pub address: String,
    /// Container port as text, empty when unavailable.
    pub port: String,
    /// Whether the pod carries a deletion timestamp.
    pub terminating: bool,
    /// Status reason.
    pub reason: String,
    /// Status message.
    pub message: String,
}

impl InstanceInfo {
    /// Extracts an [`InstanceInfo`] from a raw pod snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the pod has no name, or, for any kind
    /// other than [`EventKind::Del`], if it does not have exactly one
    /// container declaring a non-zero first port.
    pub fn parse(pod: &Pod, kind: EventKind) -> Result<Self, ParseError> {
        let name = pod
            .metadata
            .name
            .clone()
            .ok_or(ParseError::MissingName)?;

        let containers = pod.spec.as_ref().map_or(&[][..], |s| s.containers.as_slice());
        let port = containers
            .first()
            .and_then(|c| c.ports.as_deref())
            .and_then(<[_]>::first)
            .map(|p| p.container_port);

        if kind != EventKind::Del {
            match containers.len() {
                0 => return Err(ParseError::NoContainer { name }),
                1 => {}
                count => return Err(ParseError::MultiContainer { name, count }),
            }

            match port {
                None => return Err(ParseError::NoPort { name }),
                Some(0) => return Err(ParseError::EmptyPort { name }),
                Some(_) => {}
            }
        }

        let status = pod.status.as_ref();

        Ok(Self {
            name,
            namespace: pod.metadata.namespace.clone().unwrap_or_default(),
            kind,
            address: status.and_then(|s| s.pod_ip.clone()).unwrap_or_default(),
            port: port.map(|p| p.to_string()).unwrap_or_default(),
            terminating: pod.metadata.deletion_timestamp.is_some(),
            reason: status.and_then(|s| s.reason.clone()).unwrap_or_default(),
            message: status.and_then(|s| s.message.clone()).unwrap_or_default(),
        })
    }
}
