pub mod assemble;
pub mod normalize;
pub mod probe;
pub mod sync;
pub mod synthesize;
