//! Event lifecycle types and the per-event accumulator.
//!
//! ```text
//!   WarmingUp ──(background full)──► Idle ──(anomalous)──► InEvent
//!                                     ▲                       │
//!                                     └──(quiet >= post, or ──┘
//!                                         duration >= max)
//! ```

pub mod accumulator;
pub mod types;

pub use accumulator::EventAccumulator;
pub use types::{ClosureReason, DetectorPhase, EventRecord};
