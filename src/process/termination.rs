use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a managed process stopped.
///
/// Reasons with an [`event_code`](Self::event_code) are reported to the
/// control plane. The others are internal bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessTerminationReason {
    ServerProcessCrashed,
    ServerProcessForceTerminated,
    ServerProcessInvalidPath,
    ServerProcessProcessActivationTimeout,
    ServerProcessProcessReadyTimeout,
    ServerProcessSdkInitializationTimeout,
    ServerProcessTerminatedUnhealthy,
    ComputeShuttingDown,
    CustomerInitiated,
    NormalTermination,
}

impl ProcessTerminationReason {
    pub fn event_code(&self) -> Option<&'static str> {
        use ProcessTerminationReason::*;
        match self {
            ServerProcessCrashed => Some("SERVER_PROCESS_CRASHED"),
            ServerProcessForceTerminated => Some("SERVER_PROCESS_FORCE_TERMINATED"),
            ServerProcessInvalidPath => Some("SERVER_PROCESS_INVALID_PATH"),
            ServerProcessProcessActivationTimeout => {
                Some("SERVER_PROCESS_PROCESS_ACTIVATION_TIMEOUT")
            }
            ServerProcessProcessReadyTimeout => Some("SERVER_PROCESS_PROCESS_READY_TIMEOUT"),
            ServerProcessSdkInitializationTimeout => {
                Some("SERVER_PROCESS_SDK_INITIALIZATION_TIMEOUT")
            }
            ServerProcessTerminatedUnhealthy => Some("SERVER_PROCESS_TERMINATED_UNHEALTHY"),
            ComputeShuttingDown | CustomerInitiated | NormalTermination => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use ProcessTerminationReason::*;
        match self {
            ServerProcessCrashed => "ServerProcessCrashed",
            ServerProcessForceTerminated => "ServerProcessForceTerminated",
            ServerProcessInvalidPath => "ServerProcessInvalidPath",
            ServerProcessProcessActivationTimeout => "ServerProcessProcessActivationTimeout",
            ServerProcessProcessReadyTimeout => "ServerProcessProcessReadyTimeout",
            ServerProcessSdkInitializationTimeout => "ServerProcessSdkInitializationTimeout",
            ServerProcessTerminatedUnhealthy => "ServerProcessTerminatedUnhealthy",
            ComputeShuttingDown => "ComputeShuttingDown",
            CustomerInitiated => "CustomerInitiated",
            NormalTermination => "NormalTermination",
        }
    }

    /// Parses the reason carried by a forced-exit message.
    ///
    /// Matching ignores case and accepts either the reason name or its event
    /// code. Missing, blank or unknown values mean [`NormalTermination`](Self::NormalTermination).
    pub fn from_reason(reason: Option<&str>) -> Self {
        use ProcessTerminationReason::*;
        const ALL: [ProcessTerminationReason; 10] = [
            ServerProcessCrashed,
            ServerProcessForceTerminated,
            ServerProcessInvalidPath,
            ServerProcessProcessActivationTimeout,
            ServerProcessProcessReadyTimeout,
            ServerProcessSdkInitializationTimeout,
            ServerProcessTerminatedUnhealthy,
            ComputeShuttingDown,
            CustomerInitiated,
            NormalTermination,
        ];

        let Some(raw) = reason.map(str::trim).filter(|r| !r.is_empty()) else {
            return NormalTermination;
        };
        ALL.into_iter()
            .find(|r| {
                r.as_str().eq_ignore_ascii_case(raw)
                    || r.event_code().is_some_and(|c| c.eq_ignore_ascii_case(raw))
            })
            .unwrap_or(NormalTermination)
    }
}

impl fmt::Display for ProcessTerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_reasons_have_no_event_code() {
        assert_eq!(ProcessTerminationReason::ComputeShuttingDown.event_code(), None);
        assert_eq!(ProcessTerminationReason::CustomerInitiated.event_code(), None);
        assert_eq!(ProcessTerminationReason::NormalTermination.event_code(), None);
        assert_eq!(
            ProcessTerminationReason::ServerProcessSdkInitializationTimeout.event_code(),
            Some("SERVER_PROCESS_SDK_INITIALIZATION_TIMEOUT")
        );
    }

    #[test]
    fn test_from_reason() {
        assert_eq!(
            ProcessTerminationReason::from_reason(Some("customerinitiated")),
            ProcessTerminationReason::CustomerInitiated
        );
        assert_eq!(
            ProcessTerminationReason::from_reason(Some("SERVER_PROCESS_CRASHED")),
            ProcessTerminationReason::ServerProcessCrashed
        );
        assert_eq!(
            ProcessTerminationReason::from_reason(Some("  ")),
            ProcessTerminationReason::NormalTermination
        );
        assert_eq!(
            ProcessTerminationReason::from_reason(Some("bored")),
            ProcessTerminationReason::NormalTermination
        );
        assert_eq!(
            ProcessTerminationReason::from_reason(None),
            ProcessTerminationReason::NormalTermination
        );
    }
}
