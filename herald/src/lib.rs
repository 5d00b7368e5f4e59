//! The herald front-end
//!
//! Everything between the command line and the dispatch engine:
//! - [`config`]: RON configuration with environment overrides
//! - [`jobs`]: CSV batch files
//! - [`transport`]: the simulated messaging service
//! - [`report`]: text and JSON rendering of run reports
//! - [`controller`]: shutdown signals and the dispatch entry point

pub mod config;
pub mod controller;
pub mod jobs;
pub mod report;
pub mod transport;

pub use config::HeraldConfig;
pub use controller::Herald;
