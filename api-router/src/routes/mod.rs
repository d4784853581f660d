pub mod packages;
pub mod probes;
