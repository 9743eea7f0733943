pub mod grid;

pub use grid::{read_backprojection, read_filtered, read_projections,
               write_backprojection, write_filtered, write_projections};
