//! PHP lexer.
//!
//! Splits source text into a flat token stream. Only the distinctions the
//! structural parser needs are made: trivia, names, variables, literals and
//! punctuation. Keywords are plain `Name` tokens.

use crate::error::ParseError;

/// Multi-character operators, longest first.
const OPERATORS: &[&str] = &[
    "<<=", ">>=", "**=", "...", "<=>", "===", "!==", "??=", "?->", "::", "->", "=>", "++", "--",
    "==", "!=", "<>", "<=", ">=", "&&", "||", "??", "+=", "-=", "*=", "/=", ".=", "%=", "&=",
    "|=", "^=", "<<", ">>", "**",
];

/// Token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Text outside `<?php ... ?>`.
    InlineHtml,
    OpenTag,
    CloseTag,
    Whitespace,
    Comment,
    DocComment,
    /// `$name`
    Variable,
    /// Identifier, keyword or namespaced name (`Foo\Bar`, `\strlen`).
    Name,
    Number,
    /// Quoted string, backtick command, heredoc or nowdoc.
    String,
    Punct,
}

/// A single token with the line it starts on (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
}

impl Token {
    /// Whitespace and comments.
    pub fn is_trivia(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace | TokenKind::Comment | TokenKind::DocComment
        )
    }

    /// Tokens that carry program structure.
    pub fn is_significant(&self) -> bool {
        !self.is_trivia()
            && !matches!(
                self.kind,
                TokenKind::InlineHtml | TokenKind::OpenTag | TokenKind::CloseTag
            )
    }

    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == text
    }

    /// Case-insensitive keyword match.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Name && self.text.eq_ignore_ascii_case(keyword)
    }
}

/// Tokenize PHP source.
pub fn lex(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).run()
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c >= '\u{80}'
}

fn is_ident_char(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

#[derive(Debug, Clone, Copy)]
struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn bump_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.bump();
        }
    }

    /// Move to an absolute byte offset, counting newlines on the way.
    fn advance_to(&mut self, target: usize) {
        let skipped = &self.src[self.pos..target];
        self.line += skipped.matches('\n').count() as u32;
        self.pos = target;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Php,
    Html,
}

struct Lexer<'a> {
    cur: Cursor<'a>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            cur: Cursor {
                src,
                pos: 0,
                line: 1,
            },
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        while !self.cur.is_eof() {
            self.lex_inline_html();
            while !self.cur.is_eof() {
                if self.lex_php_token()? == Mode::Html {
                    break;
                }
            }
        }
        Ok(self.tokens)
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: u32) {
        self.tokens.push(Token {
            kind,
            text: self.cur.src[start..self.cur.pos].to_string(),
            line,
        });
    }

    /// Find the next open tag, returning its absolute offset and length.
    fn find_open_tag(&self) -> Option<(usize, usize)> {
        let rest = self.cur.rest();
        let mut search = 0;
        while let Some(found) = rest[search..].find("<?") {
            let at = search + found;
            let candidate = &rest[at..];
            if candidate.starts_with("<?=") {
                return Some((self.cur.pos + at, 3));
            }
            let bytes = candidate.as_bytes();
            if bytes.len() >= 5 && bytes[..5].eq_ignore_ascii_case(b"<?php") {
                let terminated = bytes
                    .get(5)
                    .map_or(true, |b| b.is_ascii_whitespace());
                if terminated {
                    return Some((self.cur.pos + at, 5));
                }
            }
            search = at + 2;
        }
        None
    }

    fn lex_inline_html(&mut self) {
        let start = self.cur.pos;
        let line = self.cur.line;

        match self.find_open_tag() {
            Some((at, len)) => {
                if at > start {
                    self.cur.advance_to(at);
                    self.push(TokenKind::InlineHtml, start, line);
                }
                let tag_line = self.cur.line;
                self.cur.advance_to(at + len);
                self.push(TokenKind::OpenTag, at, tag_line);
            }
            None => {
                self.cur.advance_to(self.cur.src.len());
                self.push(TokenKind::InlineHtml, start, line);
            }
        }
    }

    fn lex_php_token(&mut self) -> Result<Mode, ParseError> {
        let start = self.cur.pos;
        let line = self.cur.line;
        let Some(c) = self.cur.peek() else {
            return Ok(Mode::Php);
        };

        if c.is_whitespace() {
            self.cur.bump_while(char::is_whitespace);
            self.push(TokenKind::Whitespace, start, line);
        } else if self.cur.starts_with("?>") {
            self.cur.bump();
            self.cur.bump();
            if self.cur.starts_with("\r\n") {
                self.cur.bump();
                self.cur.bump();
            } else if self.cur.starts_with("\n") {
                self.cur.bump();
            }
            self.push(TokenKind::CloseTag, start, line);
            return Ok(Mode::Html);
        } else if self.cur.starts_with("#[") {
            self.cur.bump();
            self.cur.bump();
            self.push(TokenKind::Punct, start, line);
        } else if c == '#' || self.cur.starts_with("//") {
            self.lex_line_comment();
            self.push(TokenKind::Comment, start, line);
        } else if self.cur.starts_with("/*") {
            let kind = self.lex_block_comment(line)?;
            self.push(kind, start, line);
        } else if c == '$' && self.cur.peek_nth(1).is_some_and(is_ident_start) {
            self.cur.bump();
            self.cur.bump_while(is_ident_char);
            self.push(TokenKind::Variable, start, line);
        } else if is_ident_start(c)
            || (c == '\\' && self.cur.peek_nth(1).is_some_and(is_ident_start))
        {
            self.lex_name();
            self.push(TokenKind::Name, start, line);
        } else if c.is_ascii_digit() {
            self.lex_number();
            self.push(TokenKind::Number, start, line);
        } else if c == '\'' {
            self.cur.bump();
            self.scan_plain_quoted('\'', line)?;
            self.push(TokenKind::String, start, line);
        } else if c == '"' || c == '`' {
            self.scan_interpolated(c, line)?;
            self.push(TokenKind::String, start, line);
        } else if self.cur.starts_with("<<<") && self.try_heredoc(line)? {
            self.push(TokenKind::String, start, line);
        } else {
            let operator = OPERATORS.iter().find(|op| self.cur.starts_with(op));
            match operator {
                Some(op) => self.cur.advance_to(start + op.len()),
                None => {
                    self.cur.bump();
                }
            }
            self.push(TokenKind::Punct, start, line);
        }

        Ok(Mode::Php)
    }

    fn lex_line_comment(&mut self) {
        while let Some(c) = self.cur.peek() {
            if c == '\n' || self.cur.starts_with("?>") {
                break;
            }
            self.cur.bump();
        }
    }

    fn lex_block_comment(&mut self, line: u32) -> Result<TokenKind, ParseError> {
        let body_start = self.cur.pos + 2;
        let Some(end) = self.cur.src[body_start..].find("*/") else {
            return Err(ParseError::Unterminated {
                what: "comment",
                line,
            });
        };

        let body = &self.cur.src[body_start..body_start + end];
        let kind = if body.starts_with('*') && body.len() > 1 {
            TokenKind::DocComment
        } else {
            TokenKind::Comment
        };

        self.cur.advance_to(body_start + end + 2);
        Ok(kind)
    }

    fn lex_name(&mut self) {
        if self.cur.peek() == Some('\\') {
            self.cur.bump();
        }
        self.cur.bump_while(is_ident_char);
        while self.cur.peek() == Some('\\') && self.cur.peek_nth(1).is_some_and(is_ident_start) {
            self.cur.bump();
            self.cur.bump_while(is_ident_char);
        }
    }

    fn lex_number(&mut self) {
        loop {
            match self.cur.peek() {
                Some(c) if c.is_ascii_alphanumeric() || c == '_' => {
                    self.cur.bump();
                }
                Some('.') if self.cur.peek_nth(1).is_some_and(|d| d.is_ascii_digit()) => {
                    self.cur.bump();
                }
                _ => break,
            }
        }
    }

    /// Scan to the closing quote; the opening quote is already consumed.
    fn scan_plain_quoted(&mut self, quote: char, line: u32) -> Result<(), ParseError> {
        loop {
            match self.cur.bump() {
                None => {
                    return Err(ParseError::Unterminated {
                        what: "string",
                        line,
                    })
                }
                Some('\\') => {
                    self.cur.bump();
                }
                Some(c) if c == quote => return Ok(()),
                Some(_) => {}
            }
        }
    }

    /// Double-quoted or backtick string, skipping `{$...}` and `${...}`
    /// interpolations so quotes nested inside them do not end the string.
    fn scan_interpolated(&mut self, quote: char, line: u32) -> Result<(), ParseError> {
        self.cur.bump();
        loop {
            match self.cur.bump() {
                None => {
                    return Err(ParseError::Unterminated {
                        what: "string",
                        line,
                    })
                }
                Some('\\') => {
                    self.cur.bump();
                }
                Some(c) if c == quote => return Ok(()),
                Some('{') if self.cur.peek() == Some('$') => self.scan_interpolation(line)?,
                Some('$') if self.cur.peek() == Some('{') => {
                    self.cur.bump();
                    self.scan_interpolation(line)?;
                }
                Some(_) => {}
            }
        }
    }

    fn scan_interpolation(&mut self, line: u32) -> Result<(), ParseError> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.cur.bump() {
                None => {
                    return Err(ParseError::Unterminated {
                        what: "string",
                        line,
                    })
                }
                Some('{') => depth += 1,
                Some('}') => depth -= 1,
                Some(q @ ('\'' | '"')) => self.scan_plain_quoted(q, line)?,
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Heredoc or nowdoc. Returns false (consuming nothing) when `<<<` does
    /// not start a valid heredoc label.
    fn try_heredoc(&mut self, line: u32) -> Result<bool, ParseError> {
        let mut ahead = self.cur;
        ahead.advance_to(ahead.pos + 3);
        ahead.bump_while(|c| c == ' ' || c == '\t');

        let quote = match ahead.peek() {
            Some(q @ ('\'' | '"')) => {
                ahead.bump();
                Some(q)
            }
            _ => None,
        };

        let label_start = ahead.pos;
        if !ahead.peek().is_some_and(is_ident_start) {
            return Ok(false);
        }
        ahead.bump_while(is_ident_char);
        let label = &ahead.src[label_start..ahead.pos];

        if let Some(q) = quote {
            if ahead.peek() != Some(q) {
                return Ok(false);
            }
            ahead.bump();
        }

        if ahead.starts_with("\r\n") {
            ahead.bump();
            ahead.bump();
        } else if ahead.starts_with("\n") {
            ahead.bump();
        } else {
            return Ok(false);
        }

        loop {
            let rest = ahead.rest();
            let line_end = rest.find('\n');
            let text = &rest[..line_end.unwrap_or(rest.len())];
            let trimmed = text.trim_start_matches(|c| c == ' ' || c == '\t');

            let closes = trimmed.starts_with(label)
                && !trimmed[label.len()..]
                    .chars()
                    .next()
                    .is_some_and(is_ident_char);

            if closes {
                let indent = text.len() - trimmed.len();
                ahead.advance_to(ahead.pos + indent + label.len());
                self.cur = ahead;
                return Ok(true);
            }

            match line_end {
                Some(end) => ahead.advance_to(ahead.pos + end + 1),
                None => {
                    return Err(ParseError::Unterminated {
                        what: "heredoc",
                        line,
                    })
                }
            }
        }
    }
}
