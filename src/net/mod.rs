//! Role Server Fabric (C5, §4.5).

pub mod fabric;
pub mod listener;
pub mod role;
pub mod tls;

pub use fabric::RoleFabric;
