//! The sites. Each module exposes `router(state)` ready to serve or to test in-process.

pub mod catalog;
pub mod registration;
pub mod session;
pub mod shop;
