use tracing::debug;

use crate::ast::{Node, NodeKind};
use crate::error::{Error, Result, Span};
use crate::scanner::{LineToken, Scanner};

/// Trailing characters that join a logical line across physical lines.
/// Index 0 (`&`) only continues declarations; index 1 (`\`) is a pure
/// continuation marker and is stripped from the joined text.
const CONTINUATION_GLYPHS: &str = "&\\,+-/*|=([";

const ROOT: usize = 0;

struct Raw {
    text: String,
    span: Span,
    offset: usize,
    kind: NodeKind,
    key: Option<String>,
    value: Option<String>,
    children: Vec<usize>,
    column: usize,
}

impl Raw {
    fn root() -> Self {
        Self {
            text: String::new(),
            span: Span::dummy(),
            offset: 0,
            kind: NodeKind::Root,
            key: None,
            value: None,
            children: Vec::new(),
            column: 0,
        }
    }

    fn from_token(tok: &LineToken) -> Self {
        Self {
            text: tok.text.clone(),
            span: Span::new(tok.line, tok.column),
            offset: tok.offset,
            kind: NodeKind::Pending,
            key: None,
            value: None,
            children: Vec::new(),
            column: tok.column,
        }
    }
}

/// Build the node tree for a source document.
///
/// Nesting is implied by column increases and by legacy `{`/`}` pairs;
/// blank lines carry no structure. Fails on unpaired brackets, indents
/// with nothing to nest under, and unclosed block comments.
pub fn parse(source: &str) -> Result<Node> {
    let tokens: Vec<LineToken> = Scanner::new(source).collect();
    debug!(tokens = tokens.len(), "scanned source");

    let mut arena: Vec<Raw> = vec![Raw::root()];
    let mut parent = ROOT;
    let mut stack: Vec<usize> = Vec::new();
    let mut align = tokens.first().map(|t| t.column).unwrap_or(1);
    let mut i = 0;

    while i < tokens.len() {
        let tok = &tokens[i];
        let at = Span::new(tok.line, tok.column);

        while tok.column <= arena[parent].column {
            parent = stack.pop().unwrap_or(ROOT);
            if let Some(&last) = arena[parent].children.last() {
                align = arena[last].column;
            }
        }

        // Legacy brace block: `}` closes the previous open-brace sibling.
        if tok.text.starts_with('}') {
            let Some(&last) = arena[parent].children.last() else {
                return Err(Error::UnpairedBracket { open: at, at });
            };
            if !arena[last].text.ends_with('{') {
                return Err(Error::UnpairedBracket {
                    open: arena[last].span,
                    at,
                });
            }
            let text = &mut arena[last].text;
            text.pop();
            truncate_end(text);
            i += 1;
            continue;
        }

        if tok.column > align {
            if arena[parent].children.is_empty() {
                return Err(Error::BrokenIndentation(at));
            }
            align = tok.column;
            stack.push(parent);
            parent = *arena[parent].children.last().unwrap_or(&ROOT);
            continue;
        }
        i += 1;

        let id = arena.len();
        arena.push(Raw::from_token(tok));
        arena[parent].children.push(id);

        if arena[id].text.starts_with("//") {
            arena[id].kind = NodeKind::Comment;
            continue;
        }

        if arena[id].text.starts_with("/*") {
            if arena[id].text.ends_with("*/") {
                arena[id].kind = NodeKind::Comment;
            } else {
                loop {
                    let Some(next) = tokens.get(i) else {
                        return Err(Error::UnclosedComment(arena[id].span));
                    };
                    i += 1;
                    arena[id].text.push('\n');
                    arena[id].text.push_str(&next.text);
                    if arena[id].text.ends_with("*/") {
                        arena[id].kind = NodeKind::Comment;
                        break;
                    }
                }
            }
            continue;
        }

        // End-of-line comments start with ` //`.
        if let Some(tail) = arena[id].text.find(" //") {
            arena[id].text.truncate(tail);
            truncate_end(&mut arena[id].text);
        }

        // A `:` marks a declaration only when followed by a space or the
        // end of the line, and never on `@`-lines.
        let colon = if arena[id].text.starts_with('@') {
            None
        } else {
            arena[id].text.find(':').map(|p| p + 1)
        };
        let is_decl = matches!(
            colon,
            Some(p) if p == arena[id].text.len() || arena[id].text.as_bytes().get(p) == Some(&b' ')
        );

        let mut glyph = last_glyph(&arena[id].text);
        if glyph == Some(1) {
            arena[id].text.pop();
            truncate_end(&mut arena[id].text);
        }
        let joins = match glyph {
            Some(g) => is_decl || g > 0,
            None => false,
        };

        if joins {
            while let Some(next) = tokens.get(i) {
                i += 1;
                if next.text.starts_with("//") {
                    continue;
                }
                if next.text.starts_with("/*") {
                    if !next.text.ends_with("*/") {
                        while let Some(inner) = tokens.get(i) {
                            i += 1;
                            if inner.text.ends_with("*/") {
                                break;
                            }
                        }
                    }
                    continue;
                }
                match next.text.find(" //") {
                    Some(tail) => arena[id].text.push_str(next.text[..tail].trim_end()),
                    None => arena[id].text.push_str(&next.text),
                }
                glyph = last_glyph(&arena[id].text);
                if glyph == Some(1) {
                    arena[id].text.pop();
                    truncate_end(&mut arena[id].text);
                }
                match glyph {
                    None => break,
                    Some(0) if !is_decl => break,
                    _ => {}
                }
            }
        }

        if is_decl {
            let p = colon.unwrap_or(0);
            let key = arena[id].text[..p - 1].trim_end().to_string();
            let value = arena[id].text[p..].trim_start().to_string();
            let raw = &mut arena[id];
            raw.kind = NodeKind::Declaration;
            raw.key = Some(key);
            raw.value = Some(value);
        }
    }

    check_brace_closure(&arena, ROOT)?;
    debug!(nodes = arena.len() - 1, "built node tree");
    Ok(materialize(&mut arena, ROOT))
}

fn last_glyph(text: &str) -> Option<usize> {
    text.chars().last().and_then(|c| CONTINUATION_GLYPHS.find(c))
}

fn truncate_end(text: &mut String) {
    let trimmed = text.trim_end().len();
    text.truncate(trimmed);
}

/// A rule whose `{` never met a `}` is an unpaired bracket, reported
/// against the opening line.
fn check_brace_closure(arena: &[Raw], id: usize) -> Result<()> {
    for &child in &arena[id].children {
        let raw = &arena[child];
        if raw.kind == NodeKind::Pending && raw.text.ends_with('{') {
            return Err(Error::UnpairedBracket {
                open: raw.span,
                at: raw.span,
            });
        }
        check_brace_closure(arena, child)?;
    }
    Ok(())
}

fn materialize(arena: &mut Vec<Raw>, id: usize) -> Node {
    let raw = std::mem::replace(&mut arena[id], Raw::root());
    let children = raw
        .children
        .iter()
        .map(|&child| materialize(arena, child))
        .collect();
    Node {
        text: raw.text,
        span: raw.span,
        offset: raw.offset,
        kind: raw.kind,
        key: raw.key,
        value: raw.value,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outline(root: &Node) -> String {
        let mut out = String::new();
        root.walk(&mut |n, i, _| {
            let tag = match n.kind {
                NodeKind::Root => "root",
                NodeKind::Pending => "pending",
                NodeKind::Declaration => "decl",
                NodeKind::Comment => "comment",
            };
            match (&n.key, &n.value) {
                (Some(k), Some(v)) => out.push_str(&format!(":{i} {tag} {k}: {v}")),
                _ => out.push_str(&format!(":{i} {tag} {}", n.text)),
            }
            true
        });
        out
    }

    #[test]
    fn structure_vectors() {
        let cases = [
            ("div", ":0 pending div"),
            ("div\n color: red", ":0 pending div:0 decl color: red"),
            ("div{\n color: red\n}", ":0 pending div:0 decl color: red"),
            (
                "div\n each v,k of ctx.keys\n  color:   red  \n\n",
                ":0 pending div:0 pending each v,k of ctx.keys:0 decl color: red",
            ),
            (
                "div{\n color: red\n width:  10px\n}",
                ":0 pending div:0 decl color: red:1 decl width: 10px",
            ),
            (
                "let s=1;\\\nfor(let i=1;i<1;i++) {\\\ns=1;\\\n}",
                ":0 pending let s=1;for(let i=1;i<1;i++) {s=1;}",
            ),
            (
                "let s=1;\n ${s}\n  color: red",
                ":0 pending let s=1;:0 pending ${s}:0 decl color: red",
            ),
        ];
        for (src, expected) in cases {
            let root = parse(src).expect(src);
            assert_eq!(outline(&root), expected, "src {:?}", src);
        }
    }

    #[test]
    fn dedent_by_multiple_levels() {
        let root = parse("a\n b\n  c\nd").unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].children[0].children[0].text, "c");
        assert_eq!(root.children[1].text, "d");
    }

    #[test]
    fn continuation_joining_is_associative() {
        let joined = parse("a: 1,\n2,\n3").unwrap();
        let single = parse("a: 1,2,3").unwrap();
        assert_eq!(outline(&joined), outline(&single));
    }

    #[test]
    fn continuation_skips_interleaved_comments() {
        let root = parse("a: 1,\n// skip\n/* also\nskip */\n2").unwrap();
        assert_eq!(outline(&root), ":0 decl a: 1,2");
    }

    #[test]
    fn ampersand_joins_declarations_only() {
        // A trailing `&` continues a declaration value...
        let root = parse("a: x &\ny").unwrap();
        assert_eq!(outline(&root), ":0 decl a: x &y");
        // ...but a pending line ending in `&` stands alone.
        let root = parse("div &\nspan").unwrap();
        assert_eq!(outline(&root), ":0 pending div &:1 pending span");
    }

    #[test]
    fn end_of_line_comments_are_stripped() {
        let root = parse("div // box\n color: red // warm").unwrap();
        assert_eq!(outline(&root), ":0 pending div:0 decl color: red");
    }

    #[test]
    fn multi_line_comments_are_absorbed() {
        let root = parse("/* a\n b */\ndiv").unwrap();
        assert_eq!(root.children[0].kind, NodeKind::Comment);
        assert_eq!(root.children[0].text, "/* a\nb */");
        assert_eq!(root.children[1].text, "div");
    }

    #[test]
    fn at_lines_are_never_declarations() {
        let root = parse("@media (max-width: 599px)\n a\n  w: 1").unwrap();
        assert_eq!(root.children[0].kind, NodeKind::Pending);
    }

    #[test]
    fn unpaired_closing_bracket() {
        let err = parse("div\n}").unwrap_err();
        assert!(matches!(err, Error::UnpairedBracket { .. }), "{err}");
    }

    #[test]
    fn unclosed_brace_block_references_opening_line() {
        let err = parse("div{\n color: red\n").unwrap_err();
        match err {
            Error::UnpairedBracket { open, .. } => assert_eq!(open, Span::new(1, 1)),
            other => panic!("expected unpaired bracket, got {other}"),
        }
    }

    #[test]
    fn unclosed_comment() {
        let err = parse("/* never\nclosed").unwrap_err();
        assert_eq!(err, Error::UnclosedComment(Span::new(1, 1)));
    }

    #[test]
    fn empty_source_gives_empty_root() {
        let root = parse("\n  \n").unwrap();
        assert_eq!(root.kind, NodeKind::Root);
        assert!(root.children.is_empty());
    }
}
