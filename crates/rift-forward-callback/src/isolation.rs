//! Panic isolation for user-supplied extension code.
//!
//! Extension constructors and transforms are third-party code; a panic in
//! one of them is reported as an ordinary error so it can be classified and
//! recovered like any other failure.

use anyhow::anyhow;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Run `f`, turning a panic into an `Err`.
pub fn run_isolated<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
