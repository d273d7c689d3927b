//! Error types for snapshot parsing, transition detection and reporting.
//!
//! None of these ever escape a single event: the [`Hook`](crate::Hook)
//! supervisor logs them and moves on to the next notification.

use reqwest::StatusCode;
use thiserror::Error;

/// Reasons a pod snapshot cannot be turned into an [`InstanceInfo`](crate::InstanceInfo).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The snapshot has no `metadata.name`.
    #[error("pod has no name")]
    MissingName,

    /// The pod spec declares no containers at all.
    #[error("pod {name} has no container, skip")]
    NoContainer {
        /// Pod name.
        name: String,
    },

    /// Only single-container pods are supported.
    #[error("pod {name} has {count} containers, skip")]
    MultiContainer {
        /// Pod name.
        name: String,
        /// Number of declared containers.
        count: usize,
    },

    /// The container declares no port.
    #[error("pod {name} has no port in its container, skip")]
    NoPort {
        /// Pod name.
        name: String,
    },

    /// The first declared port is `0`.
    #[error("pod {name} got empty port")]
    EmptyPort {
        /// Pod name.
        name: String,
    },
}

/// Failures of the transition detector for one notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// The snapshot batch did not hold one or two pods.
    #[error("hook called with {len} snapshots, expected 1 or 2")]
    Arity {
        /// Number of snapshots received.
        len: usize,
    },

    /// An update notification arrived without the previous snapshot.
    #[error("update notification is missing the previous snapshot")]
    MissingPrevious,

    /// The current snapshot failed to parse.
    #[error("parse pod: {0}")]
    Current(#[source] ParseError),

    /// The previous snapshot failed to parse.
    #[error("parse old pod: {0}")]
    Previous(#[source] ParseError),
}

/// Failures delivering a transition to the registration endpoint.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The HTTP client could not be constructed.
    #[error("build http client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request never produced a response.
    #[error("transport: {0}")]
    Transport(#[source] reqwest::Error),

    /// The endpoint answered with something other than `200 OK`.
    #[error("hook api returned {status}, body: {body}")]
    Status {
        /// Response status.
        status: StatusCode,
        /// Response body, best effort.
        body: String,
    },
}
