//! Rolling live-time windows over the incoming measurement stream.
//!
//! ## Architecture
//!
//! ```text
//!   Measurement
//!       │
//!       ├──► short-term window  (foreground, always fed)
//!       │
//!       └──► long-term window   (background, fed only while quiet)
//!                 │
//!                 ▼
//!           spectrum / live time ──► ThresholdCalibrator
//! ```
//!
//! Both windows keep running per-channel sums; eviction is by accumulated
//! live time, not by entry count.

pub mod manager;
pub mod window;

pub use manager::BufferManager;
pub use window::{EvictionPolicy, RollingWindow};
