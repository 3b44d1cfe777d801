//! Directive grammar for policy documents.
//!
//! A policy document is plain text. Two control lines are recognized:
//!
//! ```text
//! FetchPolicy <expr>
//! FetchModule <expr>
//! ```
//!
//! The tokenizer lives in [`parser`], `$key` interpolation in [`expand`].

mod expand;
mod parser;

pub use expand::Expander;
pub use parser::{is_passthrough, parse_directive, Directive, DirectiveKind};
