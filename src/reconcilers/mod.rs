//! Reconcilers for OpenStack cluster resources
//!
//! Reconcilers are responsible for:
//! - Validating resource specs
//! - Applying the desired state through the networking API
//! - Producing the status to record

pub mod security_groups;
