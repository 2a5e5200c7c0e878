//! Audit sink backends.
//!
//! Sinks are fire-and-continue: a failed write is logged and never surfaces
//! to the caller. The one place an audit record rides inside a data
//! transaction is refresh-token rotation, which owns that write itself.

mod postgres;
mod tracing_sink;

pub use postgres::PostgresAuditSink;
pub use tracing_sink::TracingAuditSink;
