mod exports;
pub use exports::*;

pub mod backprojection;
pub mod config;
pub mod error;
pub mod filter;
pub mod gantry;
pub mod io;
pub mod model;
pub mod progress;
pub mod projections;
pub mod scatter;
pub mod spectrum;
pub mod transport;

pub use error::Error;
