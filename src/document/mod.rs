pub mod def;
pub mod element;
pub mod metrics;
pub mod tree;
