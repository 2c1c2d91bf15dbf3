//! Executable line extraction.
//!
//! A line is executable when a statement starts on it inside a function or
//! method body. Block delimiters and the keywords that only introduce a
//! block (`else`, `try`, `catch`, `finally`, `do`) and `case`/`default`
//! labels never count.

use std::collections::BTreeSet;

use crate::lexer::{Token, TokenKind};
use crate::parser::{Sections, Span};

/// Keywords after which the next token still starts a statement.
const BLOCK_INTRODUCERS: &[&str] = &["else", "try", "finally", "do"];

/// Lines that start a statement in any function or method body.
pub fn executable_lines(sections: &Sections, tokens: &[Token]) -> BTreeSet<u32> {
    let mut lines = BTreeSet::new();
    for (_, declaration) in sections.declarations() {
        if declaration.kind.is_function() {
            collect(tokens, declaration.body, &mut lines);
        }
        for body in declaration.methods.iter().filter_map(|m| m.body) {
            collect(tokens, body, &mut lines);
        }
    }
    lines
}

fn collect(tokens: &[Token], body: Span, lines: &mut BTreeSet<u32>) {
    // Skip the braces of the body itself.
    let inner = &tokens[body.start + 1..body.end.saturating_sub(1).max(body.start + 1)];

    let mut expecting = true;
    let mut in_case_label = false;
    let mut parens = 0usize;
    let mut frames: Vec<usize> = Vec::new();

    for token in inner {
        if token.kind == TokenKind::CloseTag {
            if parens == 0 {
                expecting = true;
            }
            continue;
        }
        if !token.is_significant() {
            continue;
        }

        if expecting && parens == 0 {
            if BLOCK_INTRODUCERS.iter().any(|k| token.is_keyword(k)) {
                continue;
            }
            if token.is_keyword("catch") {
                expecting = false;
                continue;
            }
            if token.is_keyword("case") || token.is_keyword("default") {
                in_case_label = true;
                expecting = false;
                continue;
            }
            if !(token.is_punct("{") || token.is_punct("}") || token.is_punct(";")) {
                lines.insert(token.line);
            }
        }
        expecting = false;

        if token.kind != TokenKind::Punct {
            continue;
        }
        match token.text.as_str() {
            "(" | "[" | "#[" => parens += 1,
            ")" | "]" => parens = parens.saturating_sub(1),
            "{" => {
                frames.push(parens);
                parens = 0;
                expecting = true;
            }
            "}" => {
                parens = frames.pop().unwrap_or(0);
                expecting = parens == 0;
            }
            ";" if parens == 0 => expecting = true,
            ":" if parens == 0 && in_case_label => {
                in_case_label = false;
                expecting = true;
            }
            _ => {}
        }
    }
}
