pub mod notifier;

pub use notifier::{TaskNotifier, SCHEDULER_ID};
