pub mod publisher;
pub mod types;

pub use publisher::{PublisherService, RemotePublisherService};
pub use types::{
    DeveloperNotification, OneTimeProductNotification, PlayStorePurchase, ProductPurchase,
    RtdnEnvelope, RtdnMessage, SubscriptionNotification, SubscriptionPurchase,
};
