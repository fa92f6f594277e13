//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging through `tracing`
//! - Each matched request runs inside a `gateway` span carrying the
//!   request ID and mapping id, so pipeline and cache events inherit both
//! - Metrics are cheap (atomic increments) and no-ops until a recorder
//!   is installed

pub mod logging;
pub mod metrics;
