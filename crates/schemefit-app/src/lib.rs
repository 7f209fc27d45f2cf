// Batch driver for the scheme-fit engine: configuration files, CSV input,
// output tables and the command-line surface.

pub mod commands;
pub mod config;
pub mod data;
pub mod output;
