//! Adapters connecting the hub to the outside world.

pub mod http;
pub mod plugins;
