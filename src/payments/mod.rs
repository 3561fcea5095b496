//! Gateway-neutral payment model, collaborator contracts and gateway adapters

pub mod appstore;
pub mod attach;
pub mod classifier;
pub mod http;
pub mod identity;
pub mod ledger;
pub mod lock;
pub mod order;
pub mod playstore;
pub mod types;
pub mod verifier;

pub use attach::{AttachService, InMemoryAttachStore, NoopAttachService};
pub use classifier::{LifecycleEvent, ReconcileAction};
pub use identity::{parse_play_order_id, TransactionIdentity};
pub use ledger::RemoteOrderService;
pub use lock::{InMemoryLocker, LockLease, Locker, NoopLocker};
pub use order::{Order, OrderInfo, OrderService, OrderServiceError};
pub use types::{PayWay, PaymentContext, PaymentRequest, PurchaseRecord};
pub use verifier::{verify_with_retry, ReceiptAuthority, ReceiptVerifier};
