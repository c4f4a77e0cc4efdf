pub mod polling;

pub use polling::{NotificationHandler, PollingClient, RequestHandler};
