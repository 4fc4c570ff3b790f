//! Backend reachability check

use lbx_core::{LockboxError, LockboxResult};
use opendal::Operator;
use std::time::Duration;

/// Upper bound on a single check; a hung endpoint counts as unreachable.
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Verify the backend is reachable and accepts our credentials by listing the root.
pub async fn check_health(op: &Operator) -> LockboxResult<()> {
    match tokio::time::timeout(CHECK_TIMEOUT, op.list("/")).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(crate::backend::map_opendal_error(e, "/")),
        Err(_) => Err(LockboxError::Network(format!(
            "storage health check timed out after {}s",
            CHECK_TIMEOUT.as_secs()
        ))),
    }
}

/// Returns true if storage is reachable, false otherwise (non-panicking)
pub async fn is_healthy(op: &Operator) -> bool {
    check_health(op).await.is_ok()
}
