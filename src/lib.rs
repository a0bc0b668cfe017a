// src/lib.rs
pub mod ports {
    pub mod panel_file;
}
pub mod cointegration;
pub mod config;
pub mod correlation;
pub mod error;
pub mod panel;
pub mod pipeline;
pub mod signal;
pub mod spread;
pub mod stats;
pub mod window;
pub mod zscore;
