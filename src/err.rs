//! Error interface for this crate.
//!
//! Every error produced by this crate implements [`Error`],
//! which adds source-line and help information on top of [`std::error::Error`].
//!
//! # Example
//! ```
//! use gumnut_sim::asm::assemble;
//! use gumnut_sim::err::Error;
//!
//! let err = assemble("ret\nfoo r1").unwrap_err();
//! assert_eq!(err.line(), Some(1));
//! assert!(err.help().is_some());
//! ```

use std::borrow::Cow;

pub use crate::parse::lex::LexErr;
pub use crate::parse::ParseErr;
pub use crate::asm::AsmErr;
pub use crate::sim::core::CoreErr;
pub use crate::sim::SimException;

/// Unified error interface for all errors in this crate.
pub trait Error: std::error::Error {
    /// The source line (0-indexed) this error occurred on, if it is known.
    fn line(&self) -> Option<usize> {
        None
    }

    /// A help message for this error, if one exists.
    fn help(&self) -> Option<Cow<str>> {
        None
    }
}
