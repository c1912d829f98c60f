//! Task execution over pooled surfaces, plus the reference CPU backend.

/// Backend traits the pipeline draws through.
pub mod backend;
pub mod cache;
/// `vello_cpu`-backed drawing backend.
pub mod cpu;
pub mod cpu_filters;
pub mod pipeline;
pub mod surface_pool;
