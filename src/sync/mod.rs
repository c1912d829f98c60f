pub mod atomic_resource;
pub mod cancel;
