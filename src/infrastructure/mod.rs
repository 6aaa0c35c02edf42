pub mod calendar_sink;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod event_mapper;
pub mod google_calendar_client;
pub mod logging;
pub mod notion_client;
pub mod notion_mapper;
pub mod oauth_client;
pub mod run_history_repository;
pub mod storage;
