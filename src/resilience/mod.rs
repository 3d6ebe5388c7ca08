//! Connection-time resilience.
//!
//! Only backend connection and schema setup retry. Per-request tier calls
//! fail once and report a miss/failure to the coordinator.

pub mod retry;
