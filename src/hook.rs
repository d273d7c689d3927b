//! Per-notification supervisor tying detection to reporting.

use k8s_openapi::api::core::v1::Pod;

use crate::pod::EventKind;
use crate::reporter::Reporter;
use crate::transition::{Transition, detect};

/// Entry point for pod lifecycle notifications.
///
/// Every failure is confined to the notification that caused it: detector
/// errors are logged and the notification is dropped, and reports run in
/// their own tasks.
#[derive(Clone, Debug)]
pub struct Hook {
    reporter: Reporter,
}

impl Hook {
    /// Creates a hook reporting to the given reporter.
    #[must_use]
    pub fn new(reporter: Reporter) -> Self {
        Self { reporter }
    }

    /// Handles one notification.
    ///
    /// `pods` holds `[current]` for create and delete notifications and
    /// `[current, previous]` for updates. A detected transition is handed to
    /// the reporter in the background and also returned. Must be called from
    /// within a tokio runtime.
    pub fn handle(&self, kind: EventKind, pods: &[Pod]) -> Option<Transition> {
        match detect(kind, pods) {
            Ok(Some(transition)) => {
                self.reporter.report(transition.clone());
                Some(transition)
            }

            Ok(None) => None,

            Err(e) => {
                tracing::warn!("hook skipped {kind} notification: {e}");
                None
            }
        }
    }
}
