pub mod bump;
pub mod bumper;
pub mod carrier;
pub mod ci;
pub mod config;
pub mod error;
pub mod git;
pub mod pipeline;
pub mod process;
pub mod step;
pub mod telemetry;
pub mod trace;
pub mod ui;

pub use error::{ReleaseError, Result};
