pub mod alert;
pub mod api;
pub mod backup_service_client;
pub mod config;
pub mod config_server;
pub mod connectivity;
pub mod console_surface;
pub mod http_client;
pub mod model;
pub mod navigation;
pub mod network_link;
pub mod orchestrator;
pub mod poll;
pub mod render;
pub mod snapshot;
