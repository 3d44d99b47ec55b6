//! Delivery telemetry.
//!
//! # SAFETY INVARIANT
//! Telemetry is a READ-ONLY side-effect layer.
//! The worker records into it but must **NEVER** read it back to decide
//! whether to flush, retry or drop. It exists for observability and tests.
//!
//! # PRIVACY INVARIANT
//! Events must **NEVER** carry the API key. Parameter names and values only
//! appear inside dropped-item warnings, which are already surfaced to the user.

pub mod event;
pub mod metrics;
pub mod recorder;
