pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod loader;
pub mod localize;
pub mod normalize;
pub mod output;
pub mod payload;
pub mod pid;
pub mod probe;
pub mod record;
pub mod registry;
pub mod report;
pub mod schema;
pub mod store;
