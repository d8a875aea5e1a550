//! Tenant cost API service
//!
//! Serves per-tenant costs, raw requests and quotas over HTTP and, when
//! persistence is enabled, records costs periodically and rolls them up by
//! month.

pub mod api;
pub mod config;
