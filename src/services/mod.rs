pub mod appstore;
pub mod attach_recovery;
pub mod playstore;
pub mod reconciler;

use crate::payments::classifier::LifecycleEvent;
use serde::Serialize;

pub use appstore::AppStoreService;
pub use attach_recovery::AttachRecovery;
pub use playstore::PlayStoreService;
pub use reconciler::{ReconcileOutcome, ReconciliationEngine};

/// Result of handling a gateway server notification.
///
/// Only `Applied` touched the ledger; the other variants are acknowledged no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Applied(ReconcileOutcome),
    Ignored { event: LifecycleEvent },
    /// Dropped by a caller-supplied filter
    Filtered,
}
