pub mod backup;
pub mod bootstrap;
pub mod context;
pub mod coordinator;
pub mod monitor;
pub mod oauth;
pub mod reconciler;
pub mod sync_runner;
