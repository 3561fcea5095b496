//! Type-safe Redis key builders

use std::fmt;

pub const VERSION: &str = "v1";

pub mod lock {
    use super::*;

    pub const NAMESPACE: &str = "lock";

    /// Lock on the *current* trade number of a transaction
    #[derive(Debug, Clone)]
    pub struct TradeLockKey {
        pub trade_no: String,
    }

    impl TradeLockKey {
        pub fn new(trade_no: impl Into<String>) -> Self {
            Self {
                trade_no: trade_no.into(),
            }
        }
    }

    impl fmt::Display for TradeLockKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:{}:trade:{}", VERSION, NAMESPACE, self.trade_no)
        }
    }
}

pub mod attach {
    use super::*;

    pub const NAMESPACE: &str = "attach";

    #[derive(Debug, Clone)]
    pub struct AttachKey {
        pub trade_no: String,
    }

    impl AttachKey {
        pub fn new(trade_no: impl Into<String>) -> Self {
            Self {
                trade_no: trade_no.into(),
            }
        }
    }

    impl fmt::Display for AttachKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:{}:{}", VERSION, NAMESPACE, self.trade_no)
        }
    }
}
