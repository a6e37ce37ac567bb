pub mod aligner;
pub mod alignment;
pub mod clump;
pub mod extend;
pub mod params;
pub mod seed;
pub mod translated;
