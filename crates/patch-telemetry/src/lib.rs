//! This crate contains the tracing primitives shared by the admission patcher profiles, most
//! notably the pre-configured console and rolling file log subscribers.
pub mod tracing;

pub use crate::tracing::Tracing;
