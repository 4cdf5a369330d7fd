pub mod assemble;
pub mod config;
pub mod explore;
pub mod features;
pub mod http_client;
pub mod metrics;
pub mod model;
pub mod reconcile;
pub mod source;
pub mod store;
pub mod table;
pub mod trainer;
