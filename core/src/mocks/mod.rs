//! Mock implementations for testing.
//!
//! - [`ManualClock`]: simulated time that only moves when told to
//! - [`FailingBackend`]: a backend whose every call fails

pub mod backend;
pub mod clock;

pub use backend::FailingBackend;
pub use clock::ManualClock;
