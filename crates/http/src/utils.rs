//! Utility macros shared across the crate.

/// Early-return with an error when a condition does not hold.
///
/// Like `assert!`, but produces an `Err` instead of panicking, which keeps
/// validation checks on the parsing path one-liners.
///
/// # Example
///
/// ```ignore
/// ensure!(colon < line_end, ParseError::HeaderMissingColon);
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
