//! Throughput aggregation for a relay-chain dashboard.
//!
//! Block-consumption updates flow one way: [`ingest`] decodes them,
//! [`recorder`] drops duplicates and keeps a bounded rolling buffer per
//! network, [`window`] and [`rates`] turn the trailing window into TPS, MB/s
//! and MGas/s, [`metrics`] smooths those, and [`store`] publishes the result.
//! [`aggregator::Aggregator`] owns one such pipeline; [`pipeline`] runs it on
//! a dedicated thread fed by [`feed`].

pub mod aggregator;
pub mod config;
pub mod feed;
pub mod ingest;
pub mod metrics;
pub mod mock;
pub mod network;
pub mod pipeline;
pub mod rates;
pub mod recorder;
pub mod registry;
pub mod store;
pub mod window;
