//! Issued credential models: redacted secrets, authorization grants, and token pairs.

pub mod grant;
pub mod pair;
pub mod secret;
