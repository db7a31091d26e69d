//! Payload models for the dataset convenience wrappers
//!
//! Typed shapes of the logical datasets the platform fetches through the
//! fallback manager. The hosted backend's wire format stays opaque; these
//! only describe the JSON bodies the wrappers decode.

mod payloads;

pub use payloads::{Loft, Testimonial};
