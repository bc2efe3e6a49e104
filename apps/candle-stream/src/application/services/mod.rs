//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SeriesPipeline`: decode, merge, gate and indicator for one event
//! - `HeartbeatTask`: periodic display token
//! - `StreamLoop`: cooperative scheduling of the poller and heartbeat

pub mod heartbeat;
pub mod pipeline;
pub mod stream_loop;

pub use heartbeat::{DEFAULT_FRAMES, HeartbeatTask, Spinner};
pub use pipeline::{PipelineStats, SeriesPipeline};
pub use stream_loop::{DEFAULT_POLL_TIMEOUT, LoopReport, StreamError, StreamLoop};
