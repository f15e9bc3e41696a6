//! Request handlers (§4.6), one module per request family.

pub mod auth;
pub mod neighborhood;
pub mod profile;
pub mod roles;
pub mod search;

pub(super) fn now_unix() -> i64 {
    crate::common::now_unix()
}
