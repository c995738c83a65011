pub mod common;
pub mod config;
pub mod export;
pub mod fetch;
pub mod normalize;
pub mod observability;
pub mod pipeline;
pub mod snapshot;
