//! Wire-facing record types shared by the session gate and dispatch stubs.

pub mod request;
