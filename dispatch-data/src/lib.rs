//! Travel-cost data sources for the dispatch engine.
//!
//! The [`routing`] module provides [`HttpGeoCostProvider`](routing::HttpGeoCostProvider),
//! a [`GeoCostProvider`](dispatch_core::GeoCostProvider) backed by the OSRM
//! Table API, and [`RetryingGeoCostProvider`](routing::RetryingGeoCostProvider),
//! which retries transient failures with capped exponential backoff.

#![forbid(unsafe_code)]

pub mod routing;
