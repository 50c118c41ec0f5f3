//! HTTP lookup surface
//!
//! Read-only axum routes served on top of the promotion store.

pub mod promotion;
pub mod router;
pub mod status;

pub use router::router;
