//! Structural parser.
//!
//! Finds namespace sections, their `use` imports and the class-like and
//! function declarations they contain. Function and method bodies are not
//! parsed; they are located by delimiter matching so that anything inside
//! them (closures, anonymous classes, `Foo::class`) is never mistaken for a
//! declaration.
//!
//! Each declaration also records its class calls: `new Name(` and
//! `Name::method(`, with `Name` resolved against the section's namespace and
//! `use` aliases.

use std::collections::BTreeMap;
use std::mem;

use crate::error::ParseError;
use crate::lexer::{Token, TokenKind};

/// Class member modifiers.
const MODIFIERS: &[&str] = &[
    "public",
    "protected",
    "private",
    "static",
    "abstract",
    "final",
    "readonly",
    "var",
];

/// Modifiers allowed in front of a class-like keyword.
const CLASS_MODIFIERS: &[&str] = &["abstract", "final", "readonly"];

/// Class names that never refer to a declared class.
const RELATIVE_CLASSES: &[&str] = &["self", "static", "parent", "class"];

/// Half-open range of token indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// Verbatim source text of the span.
    pub fn text(&self, tokens: &[Token]) -> String {
        tokens[self.start..self.end]
            .iter()
            .map(|t| t.text.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Class,
    Interface,
    Trait,
    Enum,
    Function,
}

impl DeclarationKind {
    pub fn is_function(self) -> bool {
        self == DeclarationKind::Function
    }

    fn from_keyword(token: &Token) -> Option<Self> {
        if token.kind != TokenKind::Name {
            return None;
        }
        match token.text.to_ascii_lowercase().as_str() {
            "class" => Some(Self::Class),
            "interface" => Some(Self::Interface),
            "trait" => Some(Self::Trait),
            "enum" => Some(Self::Enum),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

/// A method of a class-like declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub name: String,
    /// Modifiers through the return type, excluding the body.
    pub signature: Span,
    /// `{ ... }` including braces; `None` for abstract and interface methods.
    pub body: Option<Span>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// `use Trait;` or `use A, B { ... }`.
    TraitUse,
    Constant,
    Property,
    /// Enum `case`.
    Case,
}

/// A class member other than a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub kind: MemberKind,
    /// Attributes and modifiers through the `;` or the closing brace.
    pub span: Span,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `new Name(...)`
    Instantiation,
    /// `Name::method(...)`
    StaticCall,
}

/// A reference to a named class from inside a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassCall {
    pub kind: CallKind,
    /// Fully qualified, without the leading backslash.
    pub class: String,
    /// Token index of the class name.
    pub token: usize,
}

/// A top-level class-like or function declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: DeclarationKind,
    /// Unqualified name.
    pub name: String,
    /// From the first attribute or modifier through the closing brace.
    pub span: Span,
    /// Everything before the opening brace.
    pub header: Span,
    /// `{ ... }` including braces.
    pub body: Span,
    /// Methods, for class-like declarations.
    pub methods: Vec<Method>,
    /// Trait uses, constants, properties and enum cases in source order.
    pub members: Vec<Member>,
    pub class_calls: Vec<ClassCall>,
}

impl Declaration {
    /// Name qualified with the enclosing namespace.
    pub fn qualified_name(&self, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) if !ns.is_empty() => format!("{}\\{}", ns, self.name),
            _ => self.name.clone(),
        }
    }
}

/// Declarations sharing one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSection {
    /// `None` for the global namespace.
    pub name: Option<String>,
    /// `use ...;` statements, including the terminating semicolon.
    pub imports: Vec<Span>,
    /// Lowercased class alias to the fully qualified name it imports.
    pub aliases: BTreeMap<String, String>,
    pub declarations: Vec<Declaration>,
}

impl NamespaceSection {
    fn new(name: Option<String>) -> Self {
        Self {
            name,
            imports: Vec::new(),
            aliases: BTreeMap::new(),
            declarations: Vec::new(),
        }
    }

    /// Fully qualified form of a class name written in this section.
    pub fn resolve_class(&self, name: &str) -> String {
        if let Some(absolute) = name.strip_prefix('\\') {
            return absolute.to_string();
        }
        let (first, rest) = match name.split_once('\\') {
            Some((first, rest)) => (first, Some(rest)),
            None => (name, None),
        };
        if first.eq_ignore_ascii_case("namespace") {
            if let Some(rest) = rest {
                return self.qualify(rest);
            }
        }
        match (self.aliases.get(&first.to_ascii_lowercase()), rest) {
            (Some(target), Some(rest)) => format!("{}\\{}", target, rest),
            (Some(target), None) => target.clone(),
            (None, _) => self.qualify(name),
        }
    }

    fn qualify(&self, name: &str) -> String {
        match self.name.as_deref() {
            Some(ns) if !ns.is_empty() => format!("{}\\{}", ns, name),
            _ => name.to_string(),
        }
    }
}

/// Structure of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sections {
    /// File-level `declare(...);` statements.
    pub declares: Vec<Span>,
    /// Sections that contain at least one declaration.
    pub namespaces: Vec<NamespaceSection>,
}

impl Sections {
    /// Every declaration together with its section.
    pub fn declarations(&self) -> impl Iterator<Item = (&NamespaceSection, &Declaration)> {
        self.namespaces
            .iter()
            .flat_map(|section| section.declarations.iter().map(move |d| (section, d)))
    }
}

/// Parse a token stream into sections.
pub fn parse(tokens: &[Token]) -> Result<Sections, ParseError> {
    Parser::new(tokens)?.parse_file()
}

fn is_opener(token: &Token) -> bool {
    token.kind == TokenKind::Punct && matches!(token.text.as_str(), "(" | "[" | "{" | "#[")
}

fn closes(open: &str, close: &str) -> bool {
    matches!(
        (open, close),
        ("(", ")") | ("[", "]") | ("#[", "]") | ("{", "}")
    )
}

struct Parser<'t> {
    tokens: &'t [Token],
    /// Indices of significant tokens; parser positions index into this.
    sig: Vec<usize>,
    /// Position of the matching closer for each opener position.
    closer: Vec<Option<usize>>,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Result<Self, ParseError> {
        let sig: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_significant())
            .map(|(i, _)| i)
            .collect();

        let mut parser = Self {
            tokens,
            closer: vec![None; sig.len()],
            sig,
        };
        parser.match_delimiters()?;
        Ok(parser)
    }

    fn tok(&self, p: usize) -> &'t Token {
        &self.tokens[self.sig[p]]
    }

    fn close_of(&self, p: usize) -> usize {
        self.closer[p].unwrap_or(p)
    }

    /// Position after the group opened at `p`, or after `p` itself.
    fn skip_one(&self, p: usize) -> usize {
        if is_opener(self.tok(p)) {
            self.close_of(p) + 1
        } else {
            p + 1
        }
    }

    /// Span from position `first` through position `last` inclusive.
    fn span(&self, first: usize, last: usize) -> Span {
        Span {
            start: self.sig[first],
            end: self.sig[last] + 1,
        }
    }

    fn match_delimiters(&mut self) -> Result<(), ParseError> {
        let mut stack: Vec<usize> = Vec::new();

        for p in 0..self.sig.len() {
            let token = self.tok(p);
            if token.kind != TokenKind::Punct {
                continue;
            }
            if is_opener(token) {
                stack.push(p);
            } else if matches!(token.text.as_str(), ")" | "]" | "}") {
                let unbalanced = || ParseError::Unbalanced {
                    found: token.text.clone(),
                    line: token.line,
                };
                let open = stack.pop().ok_or_else(unbalanced)?;
                if !closes(&self.tok(open).text, &token.text) {
                    return Err(unbalanced());
                }
                self.closer[open] = Some(p);
            }
        }

        match stack.first() {
            Some(&open) => {
                let token = self.tok(open);
                Err(ParseError::Unclosed {
                    open: token.text.clone(),
                    line: token.line,
                })
            }
            None => Ok(()),
        }
    }

    fn parse_file(&self) -> Result<Sections, ParseError> {
        let end = self.sig.len();
        let mut declares = Vec::new();
        let mut finished = Vec::new();
        let mut current = NamespaceSection::new(None);
        let mut p = 0;

        while p < end {
            if !self.tok(p).is_keyword("namespace") {
                p = self.parse_item(p, end, &mut current, &mut declares)?;
                continue;
            }

            let name = match self.sig.get(p + 1).map(|&i| &self.tokens[i]) {
                Some(t) if t.kind == TokenKind::Name => Some(t.text.clone()),
                _ => None,
            };
            let after = if name.is_some() { p + 2 } else { p + 1 };

            if after < end && self.tok(after).is_punct("{") {
                let close = self.close_of(after);
                let mut section = NamespaceSection::new(name);
                let mut q = after + 1;
                while q < close {
                    q = self.parse_item(q, close, &mut section, &mut declares)?;
                }
                finished.push(section);
                p = close + 1;
            } else if after < end && self.tok(after).is_punct(";") {
                finished.push(mem::replace(&mut current, NamespaceSection::new(name)));
                p = after + 1;
            } else {
                p = self.skip_statement(p, end);
            }
        }

        finished.push(current);
        finished.retain(|section| !section.declarations.is_empty());

        Ok(Sections {
            declares,
            namespaces: finished,
        })
    }

    /// Parse one item at a statement start, returning the next position.
    fn parse_item(
        &self,
        p: usize,
        end: usize,
        section: &mut NamespaceSection,
        declares: &mut Vec<Span>,
    ) -> Result<usize, ParseError> {
        let token = self.tok(p);

        if token.is_keyword("use") {
            let semicolon = self.statement_end(p, end)?;
            section.imports.push(self.span(p, semicolon));
            self.use_aliases(p + 1, semicolon, "", &mut section.aliases);
            return Ok(semicolon + 1);
        }

        if token.is_keyword("declare") && p + 1 < end && self.tok(p + 1).is_punct("(") {
            let after = self.close_of(p + 1) + 1;
            if after < end && self.tok(after).is_punct(";") {
                declares.push(self.span(p, after));
                return Ok(after + 1);
            }
            return Ok(self.skip_statement(p, end));
        }

        // Attributes belong to the declaration that follows them.
        let item = self.skip_attributes(p, end);
        if item >= end {
            return Ok(end);
        }

        let parsed = if let Some((kind, keyword)) = self.class_like_at(item, end) {
            Some(self.parse_class(p, keyword, kind, end)?)
        } else if let Some(name) = self.function_at(item, end) {
            Some(self.parse_function(p, name, end)?)
        } else {
            None
        };

        match parsed {
            Some((mut declaration, close)) => {
                declaration.class_calls = self.class_calls(p, close, section);
                section.declarations.push(declaration);
                Ok(close + 1)
            }
            None if item > p => Ok(item),
            None => Ok(self.skip_statement(p, end)),
        }
    }

    /// Position after any `#[...]` groups starting at `p`.
    fn skip_attributes(&self, p: usize, end: usize) -> usize {
        let mut q = p;
        while q < end && self.tok(q).is_punct("#[") {
            q = self.close_of(q) + 1;
        }
        q
    }

    /// Name position of `function [&] name (` at `p`.
    fn function_at(&self, p: usize, end: usize) -> Option<usize> {
        if !self.tok(p).is_keyword("function") {
            return None;
        }
        let mut name = p + 1;
        if name < end && self.tok(name).is_punct("&") {
            name += 1;
        }
        let named = name + 1 < end
            && self.tok(name).kind == TokenKind::Name
            && self.tok(name + 1).is_punct("(");
        named.then_some(name)
    }

    /// Record the class aliases a `use` statement introduces.
    ///
    /// Handles comma lists, `as` renames and group uses (`A\{B, C as D}`).
    /// `function` and `const` imports are left out.
    fn use_aliases(
        &self,
        start: usize,
        end: usize,
        prefix: &str,
        aliases: &mut BTreeMap<String, String>,
    ) {
        let mut q = start;
        while q < end {
            let token = self.tok(q);
            if token.is_keyword("function") || token.is_keyword("const") {
                while q < end && !self.tok(q).is_punct(",") {
                    q = self.skip_one(q);
                }
                continue;
            }
            if token.kind != TokenKind::Name {
                q = self.skip_one(q);
                continue;
            }

            let path = format!("{}{}", prefix, token.text.trim_start_matches('\\'));
            if q + 2 < end && self.tok(q + 1).is_punct("\\") && self.tok(q + 2).is_punct("{") {
                let close = self.close_of(q + 2);
                self.use_aliases(q + 3, close, &format!("{}\\", path), aliases);
                q = close + 1;
                continue;
            }

            let (alias, next) = if q + 2 < end
                && self.tok(q + 1).is_keyword("as")
                && self.tok(q + 2).kind == TokenKind::Name
            {
                (self.tok(q + 2).text.clone(), q + 3)
            } else {
                let last = path.rsplit('\\').next().unwrap_or(path.as_str()).to_string();
                (last, q + 1)
            };
            aliases.insert(alias.to_ascii_lowercase(), path);
            q = next;
        }
    }

    /// `new Name(` and `Name::method(` between positions `first` and `last`.
    fn class_calls(&self, first: usize, last: usize, section: &NamespaceSection) -> Vec<ClassCall> {
        let named = |q: usize| {
            q <= last
                && self.tok(q).kind == TokenKind::Name
                && !RELATIVE_CLASSES.iter().any(|k| self.tok(q).is_keyword(k))
        };
        let punct = |q: usize, text: &str| q <= last && self.tok(q).is_punct(text);

        let mut calls = Vec::new();
        for q in first..=last {
            let (kind, name) = if self.tok(q).is_keyword("new") && named(q + 1) && punct(q + 2, "(") {
                (CallKind::Instantiation, q + 1)
            } else if named(q)
                && punct(q + 1, "::")
                && q + 2 <= last
                && self.tok(q + 2).kind == TokenKind::Name
                && punct(q + 3, "(")
                && !(q > first && (punct(q - 1, "->") || punct(q - 1, "?->") || punct(q - 1, "::")))
            {
                (CallKind::StaticCall, q)
            } else {
                continue;
            };
            calls.push(ClassCall {
                kind,
                class: section.resolve_class(&self.tok(name).text),
                token: self.sig[name],
            });
        }
        calls
    }

    /// Position of the `;` ending the statement at `p`.
    fn statement_end(&self, p: usize, end: usize) -> Result<usize, ParseError> {
        let mut q = p;
        while q < end {
            if self.tok(q).is_punct(";") {
                return Ok(q);
            }
            q = self.skip_one(q);
        }
        Err(ParseError::Unterminated {
            what: "statement",
            line: self.tok(p).line,
        })
    }

    /// Skip an expression or block statement.
    fn skip_statement(&self, p: usize, end: usize) -> usize {
        let mut q = p;
        while q < end {
            let token = self.tok(q);
            if token.is_punct(";") {
                return q + 1;
            }
            if token.is_punct("{") {
                return self.close_of(q) + 1;
            }
            q = self.skip_one(q);
        }
        end
    }

    /// Detect `[abstract|final|readonly]* (class|interface|trait|enum) Name`.
    fn class_like_at(&self, p: usize, end: usize) -> Option<(DeclarationKind, usize)> {
        let mut q = p;
        while q < end && CLASS_MODIFIERS.iter().any(|m| self.tok(q).is_keyword(m)) {
            q += 1;
        }
        if q >= end {
            return None;
        }

        let kind = DeclarationKind::from_keyword(self.tok(q))?;
        if kind == DeclarationKind::Enum {
            let named = q + 1 < end && self.tok(q + 1).kind == TokenKind::Name;
            let called = q + 2 < end && self.tok(q + 2).is_punct("(");
            if !named || called {
                return None;
            }
        }
        Some((kind, q))
    }

    fn parse_class(
        &self,
        start: usize,
        keyword: usize,
        kind: DeclarationKind,
        end: usize,
    ) -> Result<(Declaration, usize), ParseError> {
        let keyword_token = self.tok(keyword);
        let name_pos = keyword + 1;
        let name = match self.sig.get(name_pos).map(|&i| &self.tokens[i]) {
            Some(t) if name_pos < end && t.kind == TokenKind::Name && !t.text.contains('\\') => {
                t.text.clone()
            }
            _ => {
                return Err(ParseError::MissingName {
                    keyword: keyword_token.text.to_ascii_lowercase(),
                    line: keyword_token.line,
                })
            }
        };

        let missing_body = || ParseError::MissingBody {
            name: name.clone(),
            line: keyword_token.line,
        };

        let mut open = name_pos + 1;
        while open < end && !self.tok(open).is_punct("{") {
            if self.tok(open).is_punct(";") {
                return Err(missing_body());
            }
            open = self.skip_one(open);
        }
        if open >= end {
            return Err(missing_body());
        }

        let close = self.close_of(open);
        let (methods, members) = self.parse_members(open + 1, close)?;

        let declaration = Declaration {
            kind,
            name: name.clone(),
            span: self.span(start, close),
            header: Span {
                start: self.sig[start],
                end: self.sig[open],
            },
            body: self.span(open, close),
            methods,
            members,
            class_calls: Vec::new(),
        };
        Ok((declaration, close))
    }

    fn parse_members(
        &self,
        start: usize,
        end: usize,
    ) -> Result<(Vec<Method>, Vec<Member>), ParseError> {
        let mut methods = Vec::new();
        let mut members = Vec::new();
        let mut q = start;

        while q < end {
            let member_start = q;
            q = self.skip_attributes(q, end);
            if q >= end {
                break;
            }

            if self.tok(q).is_keyword("use") {
                let last = self.member_end(q, end)?;
                members.push(Member {
                    kind: MemberKind::TraitUse,
                    span: self.span(member_start, last),
                    visibility: Visibility::Public,
                });
                q = last + 1;
                continue;
            }

            let mut visibility = Visibility::Public;
            let mut r = q;
            while r < end && MODIFIERS.iter().any(|m| self.tok(r).is_keyword(m)) {
                let modifier = self.tok(r);
                if modifier.is_keyword("protected") {
                    visibility = Visibility::Protected;
                } else if modifier.is_keyword("private") {
                    visibility = Visibility::Private;
                }
                r += 1;
            }

            if r < end && self.tok(r).is_keyword("function") {
                let (method, next) = self.parse_method(member_start, r, visibility, end)?;
                methods.push(method);
                q = next;
                continue;
            }

            let kind = if r < end && self.tok(r).is_keyword("const") {
                MemberKind::Constant
            } else if r < end && self.tok(r).is_keyword("case") {
                MemberKind::Case
            } else if r > q {
                MemberKind::Property
            } else {
                q = self.skip_statement(q, end);
                continue;
            };
            let last = self.member_end(q, end)?;
            members.push(Member {
                kind,
                span: self.span(member_start, last),
                visibility,
            });
            q = last + 1;
        }

        Ok((methods, members))
    }

    /// Position of the `;` or closing `}` ending the member at `p`.
    fn member_end(&self, p: usize, end: usize) -> Result<usize, ParseError> {
        let mut q = p;
        while q < end {
            let token = self.tok(q);
            if token.is_punct(";") {
                return Ok(q);
            }
            if token.is_punct("{") {
                return Ok(self.close_of(q));
            }
            q = self.skip_one(q);
        }
        Err(ParseError::Unterminated {
            what: "member",
            line: self.tok(p).line,
        })
    }

    fn parse_method(
        &self,
        start: usize,
        keyword: usize,
        visibility: Visibility,
        end: usize,
    ) -> Result<(Method, usize), ParseError> {
        let keyword_token = self.tok(keyword);
        let mut name_pos = keyword + 1;
        if name_pos < end && self.tok(name_pos).is_punct("&") {
            name_pos += 1;
        }
        if name_pos >= end || self.tok(name_pos).kind != TokenKind::Name {
            return Err(ParseError::MissingName {
                keyword: "function".to_string(),
                line: keyword_token.line,
            });
        }
        let name = self.tok(name_pos).text.clone();

        let params = name_pos + 1;
        if params >= end || !self.tok(params).is_punct("(") {
            return Err(ParseError::MissingBody {
                name,
                line: keyword_token.line,
            });
        }

        let mut stop = self.close_of(params) + 1;
        while stop < end && !self.tok(stop).is_punct("{") && !self.tok(stop).is_punct(";") {
            stop = self.skip_one(stop);
        }
        if stop >= end {
            return Err(ParseError::MissingBody {
                name,
                line: keyword_token.line,
            });
        }

        let signature = Span {
            start: self.sig[start],
            end: self.sig[stop],
        };

        let (body, next) = if self.tok(stop).is_punct("{") {
            let close = self.close_of(stop);
            (Some(self.span(stop, close)), close + 1)
        } else {
            (None, stop + 1)
        };

        let method = Method {
            name,
            signature,
            body,
            visibility,
        };
        Ok((method, next))
    }

    fn parse_function(
        &self,
        start: usize,
        name_pos: usize,
        end: usize,
    ) -> Result<(Declaration, usize), ParseError> {
        let name_token = self.tok(name_pos);
        let name = name_token.text.clone();
        let missing_body = || ParseError::MissingBody {
            name: name.clone(),
            line: name_token.line,
        };

        let mut open = self.close_of(name_pos + 1) + 1;
        while open < end && !self.tok(open).is_punct("{") {
            if self.tok(open).is_punct(";") {
                return Err(missing_body());
            }
            open = self.skip_one(open);
        }
        if open >= end {
            return Err(missing_body());
        }

        let close = self.close_of(open);
        let declaration = Declaration {
            kind: DeclarationKind::Function,
            name: name.clone(),
            span: self.span(start, close),
            header: Span {
                start: self.sig[start],
                end: self.sig[open],
            },
            body: self.span(open, close),
            methods: Vec::new(),
            members: Vec::new(),
            class_calls: Vec::new(),
        };
        Ok((declaration, close))
    }
}
