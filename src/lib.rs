pub mod config;
pub mod constants;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod publisher;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_support;
