//! Scoped illumination control
//!
//! Brightness may only be nonzero inside an active preview or an active
//! exposure window, and must be driven back to zero on every exit path.
//! Setting and clearing the LED as two independent calls would leave it lit
//! when the wrapped operation fails or is cancelled, so the capture path
//! goes through the scoped wrapper below instead.

use crate::error::DeviceResult;
use crate::ops::SharedDeviceOps;
use std::future::Future;

/// Run `operation` with the LED at `level`, restoring brightness to 0.0
/// afterwards regardless of how the operation exits.
///
/// The restore fires on normal return and on error. If the wrapped future
/// is dropped mid-flight (task cancelled), an armed drop guard schedules a
/// best-effort turn-off instead, since `Drop` cannot await. Restore
/// failures are logged and swallowed; teardown proceeds regardless.
pub async fn with_illumination<F, T>(
    ops: &SharedDeviceOps,
    level: f64,
    operation: F,
) -> DeviceResult<T>
where
    F: Future<Output = DeviceResult<T>>,
{
    struct RestoreOnDrop {
        ops: SharedDeviceOps,
        armed: bool,
    }

    impl Drop for RestoreOnDrop {
        fn drop(&mut self) {
            if self.armed {
                tracing::debug!("Illumination scope dropped mid-operation, scheduling turn-off");
                let ops = self.ops.clone();
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        if let Err(e) = ops.illumination_set_brightness(0.0).await {
                            tracing::warn!("Failed to restore illumination after cancellation: {}", e);
                        }
                    });
                }
            }
        }
    }

    ops.illumination_set_brightness(level).await?;

    let mut guard = RestoreOnDrop {
        ops: ops.clone(),
        armed: true,
    };
    let result = operation.await;
    guard.armed = false;

    if let Err(e) = ops.illumination_set_brightness(0.0).await {
        tracing::warn!("Failed to restore illumination to 0.0: {}", e);
    }

    result
}
