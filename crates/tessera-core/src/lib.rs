//! Tessera Core — engine-wide configuration.

pub mod config;

pub use config::{DaProvider, EngineConfig, OverflowPolicy};
