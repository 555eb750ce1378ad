use crate::error::Span;

/// Semantic role of a parsed node.
///
/// `Pending` nodes have not been claimed by a compiler plugin yet; after
/// compilation every node that survives has a concrete role or has been
/// dropped together with its subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Pending,
    Declaration,
    Comment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub text: String,
    pub span: Span,
    pub offset: usize,
    pub kind: NodeKind,
    pub key: Option<String>,
    pub value: Option<String>,
    pub children: Vec<Node>,
}

impl Node {
    /// Root sentinel: zero position, no text.
    pub fn root() -> Self {
        Self {
            text: String::new(),
            span: Span::dummy(),
            offset: 0,
            kind: NodeKind::Root,
            key: None,
            value: None,
            children: Vec::new(),
        }
    }

    /// Depth-first walk over this node's descendants. The callback gets
    /// each node with its sibling index and sibling list; returning
    /// `false` skips that node's subtree.
    pub fn walk<F>(&self, f: &mut F)
    where
        F: FnMut(&Node, usize, &[Node]) -> bool,
    {
        fn go<F>(nodes: &[Node], f: &mut F)
        where
            F: FnMut(&Node, usize, &[Node]) -> bool,
        {
            for (index, node) in nodes.iter().enumerate() {
                if f(node, index, nodes) {
                    go(&node.children, f);
                }
            }
        }
        go(&self.children, f);
    }

    /// Canonical braceless rendering with two-space indentation.
    ///
    /// Declarations print as `key: value`, comments verbatim with their
    /// continuation lines aligned one column in, everything else as the
    /// node text.
    pub fn format(&self) -> String {
        let mut out = String::new();
        fmt_nodes(&self.children, 0, &mut out);
        out
    }
}

fn fmt_nodes(nodes: &[Node], depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    for node in nodes {
        if !out.is_empty() {
            out.push('\n');
            out.push_str(&indent);
        }
        match node.kind {
            NodeKind::Comment => {
                let continuation = format!("\n{} ", indent);
                out.push_str(&node.text.replace('\n', &continuation));
            }
            NodeKind::Declaration => {
                out.push_str(node.key.as_deref().unwrap_or(&node.text));
                out.push_str(": ");
                out.push_str(node.value.as_deref().unwrap_or(""));
            }
            _ => out.push_str(&node.text),
        }
        fmt_nodes(&node.children, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn format_vectors() {
        let cases = [
            ("div", "div"),
            ("div\n color: red", "div\n  color: red"),
            ("div{\n color: red\n}", "div\n  color: red"),
            (
                "div\n each v,k of ctx.keys\n  color:   red  \n\n",
                "div\n  each v,k of ctx.keys\n    color: red",
            ),
            (
                "div{\n color: red\n width:  10px\n}",
                "div\n  color: red\n  width: 10px",
            ),
            (
                "let s=1;\\\nfor(let i=1;i<1;i++) {\\\ns=1;\\\n}",
                "let s=1;for(let i=1;i<1;i++) {s=1;}",
            ),
            (
                "let s=1;\n ${s}\n  color: red",
                "let s=1;\n  ${s}\n    color: red",
            ),
        ];
        for (src, expected) in cases {
            let root = parse(src).expect(src);
            assert_eq!(root.format(), expected, "src {:?}", src);
        }
    }

    #[test]
    fn format_round_trips_structure() {
        let src = "@media (max-width:599px)\n a\n  &.b\n   w: 1\n  &.c\n   h: 2";
        let first = parse(src).unwrap();
        let second = parse(&first.format()).unwrap();
        assert_eq!(first.format(), second.format());
    }
}
