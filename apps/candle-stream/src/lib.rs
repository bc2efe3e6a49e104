#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Candle Stream - Streaming OHLCV Merge Core
//!
//! Subscribes to a live candle feed, merges incoming records into a
//! deduplicated time-ordered series, holds publication until the initial
//! snapshot completes, and hands each publishable series with its
//! cumulative VWAP to a renderer.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure merge logic and data types
//!   - `record`: candle records and the raw-event decoder
//!   - `flags`: event flag bitmask
//!   - `series`: ordered, deduplicated series store
//!   - `gate`: snapshot gate state machine
//!   - `indicator`: cumulative VWAP
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: upstream source and rendering sink interfaces
//!   - `services`: per-event pipeline, heartbeat, stream loop
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `dxlink`: DXLink WebSocket candle source
//!   - `broadcast`: channel-based rendering hand-off
//!   - `config`: environment configuration
//!   - `metrics`, `telemetry`: observability
//!
//! # Data Flow
//!
//! ```text
//! DXLink WS ──► DxLinkClient ──► StreamLoop ──► SeriesPipeline ──► SeriesBroadcast ──► renderer
//!                                    │            decode → merge → gate → VWAP
//!                                    └── HeartbeatTask ──► watch label
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core merge types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::flags::EventFlags;
pub use domain::gate::{GateState, SnapshotGate};
pub use domain::indicator::{RunningVwap, cumulative_vwap};
pub use domain::record::{CandleRecord, DecodeError, decode_candle};
pub use domain::series::{MergeOutcome, SeriesStore};

// Ports and services
pub use application::ports::{
    CandleSource, CandleSubscription, NoopMetrics, PublishedSeries, RawEvent, SeriesSink,
    SourceError, StreamMetrics,
};
pub use application::services::{
    HeartbeatTask, LoopReport, PipelineStats, SeriesPipeline, Spinner, StreamError, StreamLoop,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, Credentials, StreamConfig};

// Adapters
pub use infrastructure::broadcast::SeriesBroadcast;
pub use infrastructure::dxlink::{DxLinkClient, DxLinkClientConfig};

// Metrics
pub use infrastructure::metrics::{PrometheusMetrics, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
