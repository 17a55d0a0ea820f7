//! Failure policy for staging operations
//!
//! Every fetch, push, copy and teardown goes through [`attempt`], which decides
//! from a [`FailurePolicy`] whether a failure aborts the run, is logged, or is
//! swallowed.

use std::fmt;
use std::str::FromStr;

use cap_common::{CapError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use tracing::subscriber::NoSubscriber;

/// What to do when a staging operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log at error level and propagate.
    Raise,
    /// Swallow the failure, including anything the backend logs while trying.
    Ignore,
    /// Log a warning and carry on.
    #[default]
    Log,
}

impl FromStr for FailurePolicy {
    type Err = CapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "raise" => Ok(Self::Raise),
            "ignore" => Ok(Self::Ignore),
            "log" => Ok(Self::Log),
            _ => Err(CapError::config(format!(
                "Invalid failure policy: {s}. Use raise, ignore or log"
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raise => write!(f, "raise"),
            Self::Ignore => write!(f, "ignore"),
            Self::Log => write!(f, "log"),
        }
    }
}

/// The operation being attempted, used for log lines and errors.
#[derive(Debug, Clone)]
pub enum Action {
    Download { from: String, to: String },
    Upload { from: String, to: String },
    Copy { from: String, to: String },
    Teardown { path: String },
}

impl Action {
    fn into_error(self, source: &anyhow::Error) -> CapError {
        let message = format!("{source:#}");
        match self {
            Self::Download { from, to } => CapError::Transfer {
                action: "download".to_string(),
                from,
                to,
                message,
            },
            Self::Upload { from, to } => CapError::Transfer {
                action: "upload".to_string(),
                from,
                to,
                message,
            },
            Self::Copy { from, to } => CapError::Transfer {
                action: "copy".to_string(),
                from,
                to,
                message,
            },
            Self::Teardown { path } => CapError::Teardown { path, message },
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download { from, to } => write!(f, "downloading {from} to {to}"),
            Self::Upload { from, to } => write!(f, "uploading {from} to {to}"),
            Self::Copy { from, to } => write!(f, "copying {from} to {to}"),
            Self::Teardown { path } => write!(f, "deleting temporary directory {path}"),
        }
    }
}

/// Run `op` under `policy`.
///
/// Returns `Ok(Some(value))` on success, `Ok(None)` when the failure was
/// logged or ignored, and `Err` only under [`FailurePolicy::Raise`].
pub fn attempt<T, F>(policy: FailurePolicy, action: Action, op: F) -> Result<Option<T>>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    let outcome = match policy {
        FailurePolicy::Ignore => tracing::subscriber::with_default(NoSubscriber::default(), op),
        _ => op(),
    };

    match outcome {
        Ok(value) => Ok(Some(value)),
        Err(e) => match policy {
            FailurePolicy::Raise => {
                debug!(error = ?e, "{action} failed");
                error!("Error {action}");
                Err(action.into_error(&e))
            }
            FailurePolicy::Log => {
                debug!(error = ?e, "{action} failed");
                warn!("Error {action}");
                Ok(None)
            }
            FailurePolicy::Ignore => Ok(None),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    fn copy_action() -> Action {
        Action::Copy {
            from: "a.csv".to_string(),
            to: "b.csv".to_string(),
        }
    }

    #[test]
    fn test_success_passes_value_through() {
        for policy in [FailurePolicy::Raise, FailurePolicy::Ignore, FailurePolicy::Log] {
            let value = attempt(policy, copy_action(), || Ok(7)).unwrap();
            assert_eq!(value, Some(7));
        }
    }

    #[test]
    fn test_raise_propagates_transfer_error() {
        let err = attempt::<(), _>(FailurePolicy::Raise, copy_action(), || Err(anyhow!("disk full")))
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to copy a.csv to b.csv: disk full");
    }

    #[test]
    fn test_log_and_ignore_swallow() {
        let logged = attempt::<(), _>(FailurePolicy::Log, copy_action(), || Err(anyhow!("x"))).unwrap();
        let ignored = attempt::<(), _>(FailurePolicy::Ignore, copy_action(), || Err(anyhow!("x"))).unwrap();
        assert!(logged.is_none());
        assert!(ignored.is_none());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_ignore_silences_backend_output() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            attempt::<(), _>(FailurePolicy::Ignore, copy_action(), || {
                warn!("backend retrying ignored copy");
                Err(anyhow!("x"))
            })
            .unwrap();
            attempt::<(), _>(FailurePolicy::Log, copy_action(), || Err(anyhow!("x"))).unwrap();
        });

        let text = captured.text();
        assert!(!text.contains("backend retrying ignored copy"));
        assert_eq!(text.matches("Error copying a.csv to b.csv").count(), 1);
    }

    #[test]
    fn test_teardown_error_variant() {
        let action = Action::Teardown {
            path: "/tmp/cap-1".to_string(),
        };
        let err = attempt::<(), _>(FailurePolicy::Raise, action, || Err(anyhow!("busy"))).unwrap_err();
        assert!(matches!(err, CapError::Teardown { .. }));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("RAISE".parse::<FailurePolicy>().unwrap(), FailurePolicy::Raise);
        assert_eq!(FailurePolicy::default(), FailurePolicy::Log);
        assert!("retry".parse::<FailurePolicy>().is_err());
    }
}
