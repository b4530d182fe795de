//! Port traits: the boundaries between the domain and the outside world.

pub mod bar_store;
pub mod config_port;
pub mod position_store;
