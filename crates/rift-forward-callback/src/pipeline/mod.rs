//! The forward-with-callback pipeline.
//!
//! Resolves the named extension once per capability, applies the request
//! transform, hands the outbound request to the [`Transport`], and attaches
//! the response transform as a continuation on the returned future.
//!
//! [`Transport`]: crate::transport::Transport

mod forward;
mod outcome;

pub use forward::{ForwardFuture, ForwardPipeline};
pub use outcome::ForwardOutcome;
