//! Block durability and faction core territory on top of the region-locked
//! metadata store.

pub mod block;
pub mod config;
pub mod context;
pub mod cores;
pub mod durability;
pub mod error;
pub mod event_bus;
pub mod explosion;
pub mod faction;
pub mod handlers;
pub mod host;
pub mod policy;
pub mod repair;
pub mod simulation;
pub mod world_service;
