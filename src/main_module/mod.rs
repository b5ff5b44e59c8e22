//! HTTP liveness surface and process lifecycle helpers.

mod health;
mod server;
mod shutdown;

pub use health::*;
pub use server::*;
pub use shutdown::*;
