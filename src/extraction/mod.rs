//! PDF table extraction through the Gemini API.
//!
//! The service is treated as an untrusted collaborator: whatever it returns is
//! just another [`RawTable`](crate::RawTable) for the normalizer.

pub mod client;
pub mod extractor;
pub mod types;

pub use client::*;
pub use extractor::*;
pub use types::*;
