//! `reelqueue-scheduler`: decides when queued items are published and
//! drives the publication.
//!
//! - [`TimeSource`] supplies zone-aware "now" with advisory drift checks.
//! - [`ReadinessEvaluator`] classifies pending items as not due, due, or
//!   missed, and fails missed ones.
//! - [`UploadDriver`] publishes one claimed item under a [`RetryPolicy`],
//!   talking to the outside world only through [`Authorizer`] and
//!   [`Publisher`].
//! - [`SchedulerEngine`] ties these together on a fixed tick.

pub mod clock;
pub mod driver;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod publish;
pub mod readiness;
pub mod retry;

pub use clock::{ClockReading, FixedClock, LocalClock, ReferenceClock, SystemClock, TimeSource};
pub use driver::UploadDriver;
pub use engine::{SchedulerEngine, SchedulerHandle, TickReport, INTERRUPTED_MESSAGE, RECORD_FAILED_MESSAGE};
pub use error::{AuthError, PublishError, UploadFailure};
pub use publish::{Authorizer, Published, Publisher, UploadMetadata, UploadRequest};
pub use readiness::{missed_message, Readiness, ReadinessEvaluator};
pub use retry::RetryPolicy;
