//! External Collaborators (C10, §4.10): HTTP clients for the two services
//! this server depends on but does not implement — LOC (neighborhood
//! membership) and CAN (content-addressed publication of the server's
//! contact record and profile images).

pub mod can;
pub mod loc;
