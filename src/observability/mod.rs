//! Observability subsystem
//!
//! - Structured logging (JSON lines)
//! - Typed lifecycle events
//! - Counter metrics
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution; a failing sink never fails a run
//! 3. No background threads
//!
//! # Usage
//!
//! ```ignore
//! use condgraph::observability::{Event, Logger, ObservationScope, Severity};
//!
//! let logger = Logger::stdout(Severity::Info);
//! logger.event(Event::BranchSelected, &[("branch", "then_branch")]);
//!
//! let scope = ObservationScope::new(&logger, "BRANCH_INVOKE");
//! // ... do work ...
//! scope.complete();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{LogSink, Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};
