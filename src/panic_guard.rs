//! Converts a stray panic at a per-item loop boundary into a fatal `Error`
//! instead of unwinding across the orchestrator — spec §7: "internal panics
//! are caught and converted to fatal errors with full traceback in context".

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::Error;

pub fn guard<F, T>(f: F) -> Result<T, Error>
where
    F: FnOnce() -> T,
{
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with non-string payload".to_owned());
        Error::Fatal(format!("internal panic: {message}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_panic_to_fatal_error() {
        let result = guard(|| -> i32 { panic!("boom") });
        assert!(matches!(result, Err(Error::Fatal(msg)) if msg.contains("boom")));
    }

    #[test]
    fn passes_through_on_success() {
        assert_eq!(guard(|| 42).unwrap(), 42);
    }
}
