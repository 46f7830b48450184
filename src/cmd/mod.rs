pub mod config;
pub mod generate;
pub mod input;
pub mod probe;
pub mod sync;
