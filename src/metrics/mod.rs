//! Prometheus metrics for the OpenStack cluster operator
//!
//! Counters for reconciliation passes, remote security group operations and
//! conversions. Serving them is left to the embedding binary.

mod prometheus;

pub use self::prometheus::*;
