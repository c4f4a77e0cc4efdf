pub mod agent;
pub mod call;
pub mod onboard;
pub mod serve;
pub mod status;
