use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Status of this compute node.
///
/// The status only moves forward along
/// `Initializing → Activating → Active → Terminating → Terminated`.
/// `Interrupted` can be entered from any status before `Terminating` and
/// leads only to `Terminating` or `Terminated`. `Terminating` and
/// `Terminated` are absorbing: once entered, only the termination path itself
/// may advance the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComputeStatus {
    /// Agent started, control plane has not acknowledged it yet
    Initializing,
    /// Control plane acknowledged the compute, waiting for a ready process
    Activating,
    /// At least one process is ready or the control plane says so
    Active,
    /// The instance received an external interruption notice
    Interrupted,
    /// Draining processes before shutdown
    Terminating,
    /// All processes are gone
    Terminated,
}

impl ComputeStatus {
    /// Name as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeStatus::Initializing => "Initializing",
            ComputeStatus::Activating => "Activating",
            ComputeStatus::Active => "Active",
            ComputeStatus::Interrupted => "Interrupted",
            ComputeStatus::Terminating => "Terminating",
            ComputeStatus::Terminated => "Terminated",
        }
    }

    pub fn is_terminating_or_terminated(&self) -> bool {
        matches!(self, ComputeStatus::Terminating | ComputeStatus::Terminated)
    }

    fn rank(&self) -> u8 {
        match self {
            ComputeStatus::Initializing => 0,
            ComputeStatus::Activating => 1,
            ComputeStatus::Active => 2,
            ComputeStatus::Interrupted => 3,
            ComputeStatus::Terminating => 4,
            ComputeStatus::Terminated => 5,
        }
    }

    /// Whether moving from `self` to `next` is permitted.
    pub fn can_transition_to(&self, next: ComputeStatus) -> bool {
        use ComputeStatus::*;
        match (*self, next) {
            (from, to) if from == to => false,
            (Terminated, _) => false,
            (Terminating, to) => to == Terminated,
            (Interrupted, to) => matches!(to, Terminating | Terminated),
            (from, to) => to.rank() > from.rank(),
        }
    }
}

impl fmt::Display for ComputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComputeStatus {
    type Err = Error;

    /// Case-insensitive parse of a reported status.
    fn from_str(s: &str) -> Result<Self> {
        let status = match s.trim().to_ascii_lowercase().as_str() {
            "initializing" => ComputeStatus::Initializing,
            "activating" => ComputeStatus::Activating,
            "active" => ComputeStatus::Active,
            "interrupted" => ComputeStatus::Interrupted,
            "terminating" => ComputeStatus::Terminating,
            "terminated" => ComputeStatus::Terminated,
            other => {
                return Err(Error::Serialization(format!(
                    "Unknown compute status '{}'",
                    other
                )));
            }
        };
        Ok(status)
    }
}

/// Holds the process-wide [`ComputeStatus`] and guards its transitions.
///
/// Status changes are published on a `watch` channel so tasks can wait for a
/// given status without polling.
#[derive(Debug)]
pub struct ComputeStateMachine {
    status: watch::Sender<ComputeStatus>,
    process_ready: AtomicBool,
}

impl ComputeStateMachine {
    pub fn new() -> Self {
        Self::with_status(ComputeStatus::Initializing)
    }

    /// Creates a machine starting at `status`.
    pub fn with_status(status: ComputeStatus) -> Self {
        let (tx, _rx) = watch::channel(status);
        Self {
            status: tx,
            process_ready: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> ComputeStatus {
        *self.status.borrow()
    }

    pub fn is_terminating_or_terminated(&self) -> bool {
        self.status().is_terminating_or_terminated()
    }

    /// Moves to `next` when the transition is permitted.
    ///
    /// Returns `Ok(true)` when the status changed and `Ok(false)` when it
    /// already was `next`.
    pub fn transition_to(&self, next: ComputeStatus) -> Result<bool> {
        let mut rejected_from = None;
        let changed = self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                rejected_from = Some(*current);
                false
            }
        });

        if let Some(from) = rejected_from {
            return Err(Error::InvalidTransition {
                from: from.to_string(),
                to: next.to_string(),
            });
        }

        if changed {
            tracing::info!(status = %next, "Compute status changed");
        }
        Ok(changed)
    }

    /// `Initializing → Activating`, once the control plane has acknowledged
    /// this compute.
    ///
    /// Goes straight on to `Active` when a process became ready before the
    /// acknowledgement arrived.
    pub fn begin_activation(&self) -> Result<bool> {
        let changed =
            self.transition_to_if(ComputeStatus::Initializing, ComputeStatus::Activating)?;
        if self.process_ready.load(Ordering::SeqCst) {
            self.transition_to_if(ComputeStatus::Activating, ComputeStatus::Active)?;
        }
        Ok(changed)
    }

    /// `Activating → Active`, when a managed process became ready.
    ///
    /// While still `Initializing` the readiness is remembered for
    /// [`begin_activation`](Self::begin_activation). Returns `false` when the
    /// status did not change.
    pub fn on_process_active(&self) -> bool {
        self.process_ready.store(true, Ordering::SeqCst);
        matches!(
            self.transition_to_if(ComputeStatus::Activating, ComputeStatus::Active),
            Ok(true)
        )
    }

    /// Runs `f` unless compute is terminating, with transitions held off
    /// until `f` returns.
    ///
    /// Anything `f` registers is therefore visible to whoever moves compute
    /// to `Terminating` next. `f` must not change the status itself.
    pub fn unless_terminating<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let status = self.status.borrow();
        if status.is_terminating_or_terminated() {
            return None;
        }
        Some(f())
    }

    /// Marks the compute interrupted by an external notice.
    pub fn interrupt(&self) -> Result<bool> {
        self.transition_to(ComputeStatus::Interrupted)
    }

    /// Moves to `to` only when the current status is exactly `from`.
    fn transition_to_if(&self, from: ComputeStatus, to: ComputeStatus) -> Result<bool> {
        let changed = self.status.send_if_modified(|current| {
            if *current == from {
                *current = to;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::info!(status = %to, "Compute status changed");
        }
        Ok(changed)
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<ComputeStatus> {
        self.status.subscribe()
    }

    /// Resolves once the status satisfies `predicate`.
    pub async fn wait_until<F>(&self, mut predicate: F) -> ComputeStatus
    where
        F: FnMut(&ComputeStatus) -> bool,
    {
        let mut rx = self.subscribe();
        match rx.wait_for(|s| predicate(s)).await {
            Ok(status) => *status,
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => self.status(),
        }
    }
}

impl Default for ComputeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("ACTIVE".parse::<ComputeStatus>().unwrap(), ComputeStatus::Active);
        assert_eq!("terminating".parse::<ComputeStatus>().unwrap(), ComputeStatus::Terminating);
        assert!("Sleeping".parse::<ComputeStatus>().is_err());
    }

    #[test]
    fn test_forward_path() {
        let machine = ComputeStateMachine::new();
        assert!(machine.begin_activation().unwrap());
        assert!(machine.on_process_active());
        assert_eq!(machine.status(), ComputeStatus::Active);
        assert!(machine.transition_to(ComputeStatus::Terminating).unwrap());
        assert!(machine.transition_to(ComputeStatus::Terminated).unwrap());
    }

    #[test]
    fn test_backwards_is_rejected() {
        let machine = ComputeStateMachine::with_status(ComputeStatus::Active);
        let err = machine.transition_to(ComputeStatus::Activating).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(machine.status(), ComputeStatus::Active);
    }

    #[test]
    fn test_terminating_is_absorbing() {
        let machine = ComputeStateMachine::with_status(ComputeStatus::Terminating);
        assert!(machine.transition_to(ComputeStatus::Active).is_err());
        assert!(machine.interrupt().is_err());
        assert!(!machine.on_process_active());
        assert_eq!(machine.status(), ComputeStatus::Terminating);
    }

    #[test]
    fn test_terminated_accepts_nothing() {
        let machine = ComputeStateMachine::with_status(ComputeStatus::Terminated);
        for next in [
            ComputeStatus::Initializing,
            ComputeStatus::Active,
            ComputeStatus::Interrupted,
            ComputeStatus::Terminating,
        ] {
            assert!(machine.transition_to(next).is_err());
        }
    }

    #[test]
    fn test_interrupted_only_leads_to_termination() {
        let machine = ComputeStateMachine::with_status(ComputeStatus::Activating);
        assert!(machine.interrupt().unwrap());
        assert!(machine.transition_to(ComputeStatus::Active).is_err());
        assert!(machine.transition_to(ComputeStatus::Terminating).unwrap());
    }

    #[test]
    fn test_same_status_is_noop() {
        let machine = ComputeStateMachine::with_status(ComputeStatus::Active);
        assert!(!machine.transition_to(ComputeStatus::Active).unwrap());
    }

    #[test]
    fn test_process_active_requires_activating() {
        let machine = ComputeStateMachine::new();
        assert!(!machine.on_process_active());
        assert_eq!(machine.status(), ComputeStatus::Initializing);
    }

    #[test]
    fn test_ready_before_acknowledgement_activates_on_acknowledgement() {
        let machine = ComputeStateMachine::new();
        assert!(!machine.on_process_active());
        assert_eq!(machine.status(), ComputeStatus::Initializing);

        assert!(machine.begin_activation().unwrap());
        assert_eq!(machine.status(), ComputeStatus::Active);
    }

    #[test]
    fn test_unless_terminating() {
        let machine = ComputeStateMachine::with_status(ComputeStatus::Active);
        assert_eq!(machine.unless_terminating(|| 7), Some(7));

        machine.transition_to(ComputeStatus::Terminating).unwrap();
        assert_eq!(machine.unless_terminating(|| 7), None);
    }

    #[tokio::test]
    async fn test_wait_until_terminated() {
        let machine = std::sync::Arc::new(ComputeStateMachine::with_status(ComputeStatus::Active));
        let waiter = {
            let machine = machine.clone();
            tokio::spawn(async move { machine.wait_until(|s| *s == ComputeStatus::Terminated).await })
        };
        machine.transition_to(ComputeStatus::Terminating).unwrap();
        machine.transition_to(ComputeStatus::Terminated).unwrap();
        assert_eq!(waiter.await.unwrap(), ComputeStatus::Terminated);
    }
}
