pub mod api;
pub mod cache;
pub mod config;
pub mod k8s;
pub mod scheduler;
pub mod topology;
