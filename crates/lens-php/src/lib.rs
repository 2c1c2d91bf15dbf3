//! PHP structural pipeline for Lens.
//!
//! `transform` lexes and parses one source file; the result yields the
//! live and mock artifacts for each declaration and the set of executable
//! lines used by coverage.
//!
//! # Example
//!
//! ```
//! let transformed = lens_php::transform("<?php\nfunction f() {\n    return 1;\n}\n").unwrap();
//! let bundle = transformed.generate();
//! assert!(bundle.live.functions.contains_key("f"));
//! assert_eq!(transformed.executable_lines().into_iter().collect::<Vec<_>>(), vec![3]);
//! ```

mod error;
mod generator;
pub mod lexer;
pub mod parser;
mod statements;

use std::collections::BTreeSet;

pub use error::ParseError;
pub use generator::{GeneratedBundle, Variant};
pub use lexer::{Token, TokenKind};
pub use parser::{CallKind, ClassCall, Declaration, DeclarationKind, Member, MemberKind, Sections};

/// A lexed and parsed source file.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub tokens: Vec<Token>,
    pub sections: Sections,
}

impl Transformed {
    /// Live and mock sources for every declaration.
    pub fn generate(&self) -> GeneratedBundle {
        generator::generate(&self.sections, &self.tokens)
    }

    /// Lines that start a statement inside a function or method body.
    pub fn executable_lines(&self) -> BTreeSet<u32> {
        statements::executable_lines(&self.sections, &self.tokens)
    }
}

/// Lex and parse `source`.
pub fn transform(source: &str) -> Result<Transformed, ParseError> {
    let tokens = lexer::lex(source)?;
    let sections = parser::parse(&tokens)?;
    Ok(Transformed { tokens, sections })
}
