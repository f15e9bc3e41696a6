//! Neighborhood Action Processor (C8, §4.8, §4.9): the outbound half of
//! neighborhood synchronization. `session::handlers::neighborhood` handles
//! what arrives on an inbound `ServerNeighbor` connection; this module
//! drains the action queue those handlers (and profile updates, and Cron)
//! enqueue, dialing out to followers and neighbors to deliver it.

pub mod apply;
pub mod client;
pub mod processor;

pub use processor::NeighborhoodProcessor;
