//! Configuration Module
//!
//! Configuration loading for the candle stream binary.

mod settings;

pub use settings::{
    ConfigError, Credentials, DEFAULT_DXLINK_URL, DxLinkSettings, LoopSettings, StreamConfig,
};
