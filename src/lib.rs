#![deny(missing_docs)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Kubernetes pod reachability transitions for external service registries.
//!
//! Pod watch events are noisy: they arrive at least once, are only partially
//! ordered, and most updates touch nothing a load balancer cares about. This
//! crate watches pods, compares each update's before and after snapshots, and
//! reports the few changes that matter to an HTTP registration endpoint:
//!
//! - **ADD** when a pod gets its IP or its port changes
//! - **DEL** when a pod starts terminating
//!
//! Each transition is posted once as a form (`podname`, `namespace`, `ip`,
//! `port`, `state`) without retries. Failures are logged and never stop the
//! watch.
//!
//! # Usage
//!
//! ```ignore
//! use k8s_endpoint_hook::{Hook, Reporter, ReporterConfig, WatchConfig, watch};
//!
//! let reporter = Reporter::new(ReporterConfig::new("http://registry:8081/hook"))?;
//! let config = WatchConfig::new().namespace("shop");
//!
//! watch(config, Hook::new(reporter)).await?;
//! ```
//!
//! Notifications from another event source can be fed to [`Hook::handle`]
//! directly, and [`detect`] is available as a pure function.

mod error;
mod hook;
mod k8s;
mod pod;
mod reporter;
mod transition;

pub use error::{HookError, ParseError, ReportError};
pub use hook::Hook;
pub use k8s::{WatchConfig, watch};
pub use pod::{EventKind, InstanceInfo};
pub use reporter::{
    DEFAULT_ENDPOINT, DEFAULT_MAX_IN_FLIGHT, DEFAULT_TIMEOUT, Reporter, ReporterConfig,
};
pub use transition::{Transition, TransitionKind, detect};
