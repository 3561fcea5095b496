pub mod authority;
pub mod types;

pub use authority::HttpReceiptAuthority;
pub use types::{
    latest_transaction, AppStoreInApp, AppStoreNotification, IapResponse, Receipt, UnifiedReceipt,
};
