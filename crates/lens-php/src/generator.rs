//! Live and mock source generation.
//!
//! Every declaration becomes two standalone files. Both start with a
//! single header line re-establishing the file's `declare`s, namespace and
//! imports, so each artifact can be loaded on its own.
//!
//! * live: the declaration verbatim, preceded by enough newlines that it
//!   starts on the same line as in the original file. Coverage and error
//!   line numbers reported against a live artifact therefore match the
//!   user's source. Class names of `new` and static calls are written fully
//!   qualified, so the artifact does not depend on the imports it was cut
//!   from.
//! * mock: the declaration header, its trait uses, enum cases and public
//!   constants and properties, and the public method signatures with empty
//!   bodies.

use std::collections::BTreeMap;

use crate::lexer::Token;
use crate::parser::{
    Declaration, DeclarationKind, Member, Method, NamespaceSection, Sections, Span, Visibility,
};

/// Keywords removed from mock class and method headers.
const MOCK_DROPPED: &[&str] = &["abstract", "final"];

/// Generated sources keyed by fully qualified name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variant {
    pub classes: BTreeMap<String, String>,
    pub functions: BTreeMap<String, String>,
}

impl Variant {
    fn insert(&mut self, kind: DeclarationKind, name: String, source: String) {
        if kind.is_function() {
            self.functions.insert(name, source);
        } else {
            self.classes.insert(name, source);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedBundle {
    pub live: Variant,
    pub mock: Variant,
}

impl GeneratedBundle {
    /// True when the source declared nothing.
    pub fn is_empty(&self) -> bool {
        self.live.classes.is_empty() && self.live.functions.is_empty()
    }
}

/// Generate live and mock sources for every declaration.
pub fn generate(sections: &Sections, tokens: &[Token]) -> GeneratedBundle {
    let declares: Vec<String> = sections
        .declares
        .iter()
        .map(|span| normalize(tokens, *span, &[]))
        .collect();

    let mut bundle = GeneratedBundle::default();
    for section in &sections.namespaces {
        let header = file_header(&declares, section, tokens);
        for declaration in &section.declarations {
            let name = declaration.qualified_name(section.name.as_deref());
            bundle.live.insert(
                declaration.kind,
                name.clone(),
                live_source(&header, declaration, tokens),
            );
            bundle.mock.insert(
                declaration.kind,
                name,
                mock_source(&header, declaration, tokens),
            );
        }
    }
    bundle
}

/// Significant tokens of a span joined by single spaces where the source
/// had trivia.
fn normalize(tokens: &[Token], span: Span, dropped: &[&str]) -> String {
    let mut out = String::new();
    let mut spaced = false;

    for token in &tokens[span.start..span.end] {
        if !token.is_significant() || dropped.iter().any(|k| token.is_keyword(k)) {
            spaced = true;
            continue;
        }
        if spaced && !out.is_empty() {
            out.push(' ');
        }
        spaced = false;
        out.push_str(&token.text);
    }
    out
}

fn file_header(declares: &[String], section: &NamespaceSection, tokens: &[Token]) -> String {
    let mut header = String::from("<?php");
    for declare in declares {
        header.push(' ');
        header.push_str(declare);
    }
    if let Some(name) = &section.name {
        header.push_str(" namespace ");
        header.push_str(name);
        header.push(';');
    }
    for import in &section.imports {
        header.push(' ');
        header.push_str(&normalize(tokens, *import, &[]));
    }
    header
}

fn live_source(header: &str, declaration: &Declaration, tokens: &[Token]) -> String {
    let line = tokens[declaration.span.start].line;
    let mut out = String::from(header);
    if line <= 1 {
        out.push(' ');
    } else {
        for _ in 1..line {
            out.push('\n');
        }
    }

    let span = declaration.span;
    let mut calls = declaration.class_calls.iter().map(|c| (c.token, &c.class)).peekable();
    for (index, token) in tokens.iter().enumerate().take(span.end).skip(span.start) {
        match calls.next_if(|(at, _)| *at == index) {
            Some((_, class)) => {
                out.push('\\');
                out.push_str(class);
            }
            None => out.push_str(&token.text),
        }
    }
    out.push('\n');
    out
}

fn mock_source(header: &str, declaration: &Declaration, tokens: &[Token]) -> String {
    let mut out = String::from(header);
    out.push_str("\n\n");

    if declaration.kind.is_function() {
        out.push_str(&normalize(tokens, declaration.header, &[]));
        out.push_str("\n{\n}\n");
        return out;
    }

    out.push_str(&normalize(tokens, declaration.header, MOCK_DROPPED));
    out.push_str("\n{\n");

    let mut members: Vec<(usize, String)> = declaration
        .members
        .iter()
        .filter(|m| m.visibility == Visibility::Public)
        .map(|m| (m.span.start, mock_member(m, tokens)))
        .chain(
            declaration
                .methods
                .iter()
                .filter(|m| m.visibility == Visibility::Public)
                .map(|m| (m.signature.start, mock_method(m, declaration.kind, tokens))),
        )
        .collect();
    members.sort_by_key(|(start, _)| *start);
    let members: Vec<String> = members.into_iter().map(|(_, text)| text).collect();
    if !members.is_empty() {
        out.push_str(&members.join("\n\n"));
        out.push('\n');
    }

    out.push_str("}\n");
    out
}

fn mock_member(member: &Member, tokens: &[Token]) -> String {
    format!("\t{}", normalize(tokens, member.span, MOCK_DROPPED))
}

fn mock_method(method: &Method, kind: DeclarationKind, tokens: &[Token]) -> String {
    if kind == DeclarationKind::Interface {
        format!("\t{};", normalize(tokens, method.signature, &[]))
    } else {
        format!(
            "\t{}\n\t{{\n\t}}",
            normalize(tokens, method.signature, MOCK_DROPPED)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn bundle(source: &str) -> GeneratedBundle {
        let tokens = lex(source).unwrap();
        let sections = parse(&tokens).unwrap();
        generate(&sections, &tokens)
    }

    const SOURCE: &str = r#"<?php

namespace Acme\Util;

use Acme\Base;

/** Doc */
final class Foo extends Base implements \Countable
{
    const X = 1;

    private $items = [];

    public function __construct(array $items = [])
    {
        $this->items = $items;
    }

    public function count(): int
    {
        return count($this->items);
    }

    protected function hidden()
    {
    }

    public static function make(): self
    {
        return new self();
    }
}

function helper($a, $b = 'x{')
{
    return $a . $b;
}
"#;

    #[test]
    fn test_names_are_qualified() {
        let bundle = bundle(SOURCE);
        let classes: Vec<&String> = bundle.live.classes.keys().collect();
        let functions: Vec<&String> = bundle.live.functions.keys().collect();
        assert_eq!(classes, vec!["Acme\\Util\\Foo"]);
        assert_eq!(functions, vec!["Acme\\Util\\helper"]);
        assert_eq!(
            bundle.mock.classes.keys().collect::<Vec<_>>(),
            classes
        );
    }

    #[test]
    fn test_live_preserves_line_numbers() {
        let bundle = bundle(SOURCE);
        let live = &bundle.live.classes["Acme\\Util\\Foo"];
        let lines: Vec<&str> = live.lines().collect();

        assert_eq!(lines[0], "<?php namespace Acme\\Util; use Acme\\Base;");
        assert_eq!(lines[7], "final class Foo extends Base implements \\Countable");
        assert_eq!(lines[15], "        $this->items = $items;");
        assert!(lines[1..7].iter().all(|l| l.is_empty()));
        assert!(live.ends_with("}\n"));

        let helper = &bundle.live.functions["Acme\\Util\\helper"];
        assert_eq!(helper.lines().nth(33), Some("function helper($a, $b = 'x{')"));
        assert_eq!(helper.lines().nth(35), Some("    return $a . $b;"));
    }

    #[test]
    fn test_mock_class_keeps_public_signatures() {
        let bundle = bundle(SOURCE);
        let expected = "<?php namespace Acme\\Util; use Acme\\Base;

class Foo extends Base implements \\Countable
{
\tconst X = 1;

\tpublic function __construct(array $items = [])
\t{
\t}

\tpublic function count(): int
\t{
\t}

\tpublic static function make(): self
\t{
\t}
}
";
        assert_eq!(bundle.mock.classes["Acme\\Util\\Foo"], expected);
    }

    #[test]
    fn test_mock_keeps_public_members() {
        let source = "<?php\nenum Suit: string\n{\n    use Labels;\n\n    case Hearts = 'H';\n    case Spades = 'S';\n\n    private const SECRET = 1;\n    final public const WILD = self::Spades;\n\n    public function color(): string\n    {\n        return 'red';\n    }\n}\n";
        let bundle = bundle(source);
        assert_eq!(
            bundle.mock.classes["Suit"],
            "<?php\n\nenum Suit: string\n{\n\tuse Labels;\n\n\tcase Hearts = 'H';\n\n\tcase Spades = 'S';\n\n\tpublic const WILD = self::Spades;\n\n\tpublic function color(): string\n\t{\n\t}\n}\n"
        );

        let bundle = self::bundle("<?php\nclass Box\n{\n    public $size = 3;\n    protected $weight;\n    public static ?Box $empty = null;\n}\n");
        assert_eq!(
            bundle.mock.classes["Box"],
            "<?php\n\nclass Box\n{\n\tpublic $size = 3;\n\n\tpublic static ?Box $empty = null;\n}\n"
        );
    }

    #[test]
    fn test_attributes_survive_in_both_variants() {
        let bundle = bundle("<?php\n#[\\Attribute]\nfinal class Marker {}\n");
        assert_eq!(bundle.live.classes["Marker"], "<?php\n#[\\Attribute]\nfinal class Marker {}\n");
        assert_eq!(bundle.mock.classes["Marker"], "<?php\n\n#[\\Attribute] class Marker\n{\n}\n");
    }

    #[test]
    fn test_live_class_calls_are_fully_qualified() {
        let source = "<?php\nnamespace App;\n\nuse Vendor\\Clock as Time;\n\nfunction stamp()\n{\n    $now = Time::now();\n    return new Stamp($now, new \\DateTimeZone('UTC'));\n}\n";
        let bundle = bundle(source);
        let live = &bundle.live.functions["App\\stamp"];
        let lines: Vec<&str> = live.lines().collect();

        assert_eq!(lines[0], "<?php namespace App; use Vendor\\Clock as Time;");
        assert_eq!(lines[7], "    $now = \\Vendor\\Clock::now();");
        assert_eq!(
            lines[8],
            "    return new \\App\\Stamp($now, new \\DateTimeZone('UTC'));"
        );
    }

    #[test]
    fn test_mock_function() {
        let bundle = bundle(SOURCE);
        assert_eq!(
            bundle.mock.functions["Acme\\Util\\helper"],
            "<?php namespace Acme\\Util; use Acme\\Base;\n\nfunction helper($a, $b = 'x{')\n{\n}\n"
        );
    }

    #[test]
    fn test_declaration_on_first_line() {
        let bundle = bundle("<?php class A { }\n");
        assert_eq!(bundle.live.classes["A"], "<?php class A { }\n");
        assert_eq!(bundle.mock.classes["A"], "<?php\n\nclass A\n{\n}\n");
    }

    #[test]
    fn test_interface_methods_keep_semicolons() {
        let bundle = bundle("<?php\ninterface Shape\n{\n    public function area(): float;\n}\n");
        assert_eq!(
            bundle.mock.classes["Shape"],
            "<?php\n\ninterface Shape\n{\n\tpublic function area(): float;\n}\n"
        );
    }

    #[test]
    fn test_abstract_methods_get_bodies() {
        let bundle = bundle("<?php\nabstract class Shape\n{\n    abstract public function area(): float;\n}\n");
        assert_eq!(
            bundle.mock.classes["Shape"],
            "<?php\n\nclass Shape\n{\n\tpublic function area(): float\n\t{\n\t}\n}\n"
        );
    }

    #[test]
    fn test_declares_join_header() {
        let bundle = bundle("<?php\ndeclare(strict_types=1);\n\nfunction f() {}\n");
        assert_eq!(
            bundle.live.functions["f"],
            "<?php declare(strict_types=1);\n\n\nfunction f() {}\n"
        );
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(bundle(SOURCE), bundle(SOURCE));
    }

    #[test]
    fn test_empty_source() {
        assert!(bundle("<?php\n$x = 1;\n").is_empty());
    }
}
