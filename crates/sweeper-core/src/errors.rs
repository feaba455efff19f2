use std::fmt;

/// Sentinel errors a resource implementation can return to steer the engine.
///
/// Listers return `SkipRequest`/`UnknownEndpoint` for kinds that are not
/// available in the scanned scope; `remove` returns `HoldResource` when the
/// resource is temporarily un-removable and should be retried every sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    SkipRequest(String),
    UnknownEndpoint(String),
    WaitResource(String),
    HoldResource(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkipRequest(msg) => write!(f, "skip request: {msg}"),
            Self::UnknownEndpoint(msg) => write!(f, "unknown endpoint: {msg}"),
            Self::WaitResource(msg) => write!(f, "waiting for resource: {msg}"),
            Self::HoldResource(msg) => write!(f, "holding resource: {msg}"),
        }
    }
}

impl std::error::Error for ResourceError {}

fn chain_has(err: &anyhow::Error, pred: fn(&ResourceError) -> bool) -> bool {
    err.chain().any(|cause| cause.downcast_ref::<ResourceError>().is_some_and(pred))
}

pub fn is_skip_request(err: &anyhow::Error) -> bool {
    chain_has(err, |e| matches!(e, ResourceError::SkipRequest(_)))
}

pub fn is_unknown_endpoint(err: &anyhow::Error) -> bool {
    chain_has(err, |e| matches!(e, ResourceError::UnknownEndpoint(_)))
}

pub fn is_wait_resource(err: &anyhow::Error) -> bool {
    chain_has(err, |e| matches!(e, ResourceError::WaitResource(_)))
}

pub fn is_hold_resource(err: &anyhow::Error) -> bool {
    chain_has(err, |e| matches!(e, ResourceError::HoldResource(_)))
}
