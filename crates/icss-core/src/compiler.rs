use tracing::debug;

use crate::ast::{Node, NodeKind};
use crate::error::{Error, Result};
use crate::ir::{Instruction, Program, Template};

/// Compilation settings shared by every plugin.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Name of the context parameter in rendered instruction text.
    pub ctx_name: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            ctx_name: "ctx".to_string(),
        }
    }
}

/// Result of a plugin claiming a node.
///
/// `Discard` claims the node and drops it silently (ordinary comments);
/// `Emit` contributes instructions, of which at most one, counted
/// recursively through bodies, may be the `Nested` children placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Discard,
    Emit(Vec<Instruction>),
}

/// A compiler plugin. Plugins are tried in list order; the first one to
/// return `Some` claims the node. Nodes no plugin claims are dropped
/// together with their subtree.
pub trait Plugin {
    fn try_compile(
        &self,
        node: &Node,
        options: &CompileOptions,
        index: usize,
        siblings: &[Node],
    ) -> Option<Fragment>;
}

/// Compile a parsed tree into an instruction program.
pub fn compile(
    root: &Node,
    plugins: &[Box<dyn Plugin>],
    options: &CompileOptions,
) -> Result<Program> {
    let program = compile_nodes(&root.children, plugins, options)?;
    debug!(instructions = program.0.len(), "compiled node tree");
    Ok(program)
}

fn compile_nodes(
    nodes: &[Node],
    plugins: &[Box<dyn Plugin>],
    options: &CompileOptions,
) -> Result<Program> {
    let mut out = Vec::new();
    for (index, node) in nodes.iter().enumerate() {
        let claimed = plugins
            .iter()
            .find_map(|plugin| plugin.try_compile(node, options, index, nodes));
        let Some(fragment) = claimed else {
            continue;
        };
        let Fragment::Emit(steps) = fragment else {
            continue;
        };

        let holes = count_placeholders(&steps);
        if holes > 1 {
            return Err(Error::TooManyPlaceholders(node.span));
        }
        if holes == 1 && node.children.is_empty() {
            return Err(Error::EmptyNodePlaceholder(node.span));
        }

        if node.children.is_empty() {
            out.extend(steps);
        } else {
            let children = compile_nodes(&node.children, plugins, options)?;
            if holes == 1 {
                let mut pending = Some(children);
                out.extend(splice(steps, &mut pending));
            } else {
                out.extend(steps);
                out.extend(children.0);
            }
        }
    }
    Ok(Program(out))
}

fn count_placeholders(steps: &[Instruction]) -> usize {
    steps
        .iter()
        .map(|inst| match inst {
            Instruction::Nested => 1,
            Instruction::RawControlFlow { body, .. }
            | Instruction::EachLoop { body, .. }
            | Instruction::LetBinding { body, .. } => count_placeholders(&body.0),
            _ => 0,
        })
        .sum()
}

fn splice(steps: Vec<Instruction>, children: &mut Option<Program>) -> Vec<Instruction> {
    let mut out = Vec::with_capacity(steps.len());
    for inst in steps {
        match inst {
            Instruction::Nested => {
                if let Some(program) = children.take() {
                    out.extend(program.0);
                }
            }
            Instruction::RawControlFlow { text, body } => out.push(Instruction::RawControlFlow {
                text,
                body: Program(splice(body.0, children)),
            }),
            Instruction::EachLoop {
                collection,
                value,
                key,
                body,
            } => out.push(Instruction::EachLoop {
                collection,
                value,
                key,
                body: Program(splice(body.0, children)),
            }),
            Instruction::LetBinding {
                pattern,
                expr,
                body,
            } => out.push(Instruction::LetBinding {
                pattern,
                expr,
                body: Program(splice(body.0, children)),
            }),
            other => out.push(other),
        }
    }
    out
}

fn body_for(node: &Node) -> Program {
    if node.children.is_empty() {
        Program::default()
    } else {
        Program(vec![Instruction::Nested])
    }
}

/// Control-flow plugin: `if`, `each` and `let` lines.
///
/// Claims `Pending` nodes only, so declarations keep their priority.
/// Lines that do not match any of the three shapes fall through to the
/// rule plugin unchanged.
pub struct ScriptPlugin;

impl Plugin for ScriptPlugin {
    fn try_compile(
        &self,
        node: &Node,
        _options: &CompileOptions,
        _index: usize,
        _siblings: &[Node],
    ) -> Option<Fragment> {
        if node.kind != NodeKind::Pending {
            return None;
        }
        let text = node.text.as_str();

        if text.starts_with("if(") || text.starts_with("if (") {
            let guard = text
                .trim_end()
                .strip_suffix("{...}")
                .map(str::trim_end)
                .unwrap_or(text)
                .to_string();
            return Some(Fragment::Emit(vec![Instruction::RawControlFlow {
                text: guard,
                body: body_for(node),
            }]));
        }

        if let Some(rest) = text.strip_prefix("each ") {
            return parse_each(rest, node);
        }

        if let Some(rest) = text.strip_prefix("let ") {
            return parse_let(rest, node);
        }

        None
    }
}

fn parse_each(rest: &str, node: &Node) -> Option<Fragment> {
    let (bindings, collection) = rest.split_once(" of ")?;
    let collection = collection.trim().trim_end_matches(';').trim_end();
    if collection.is_empty() {
        return None;
    }
    let names: Vec<&str> = bindings.split(',').map(str::trim).collect();
    if names.is_empty() || names.len() > 2 || !names.iter().all(|n| is_identifier(n)) {
        return None;
    }
    Some(Fragment::Emit(vec![Instruction::EachLoop {
        collection: collection.to_string(),
        value: names[0].to_string(),
        key: names.get(1).map(|k| k.to_string()),
        body: body_for(node),
    }]))
}

fn parse_let(rest: &str, node: &Node) -> Option<Fragment> {
    let (pattern, expr) = rest.split_once('=')?;
    let pattern = pattern.trim();
    let expr = expr.trim().trim_end_matches(';').trim_end();
    if pattern.is_empty() || expr.is_empty() {
        return None;
    }
    Some(Fragment::Emit(vec![Instruction::LetBinding {
        pattern: pattern.to_string(),
        expr: expr.to_string(),
        body: body_for(node),
    }]))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// The default plugin: declarations, comments and the catch-all rule.
pub struct StylePlugin;

impl Plugin for StylePlugin {
    fn try_compile(
        &self,
        node: &Node,
        _options: &CompileOptions,
        _index: usize,
        _siblings: &[Node],
    ) -> Option<Fragment> {
        match node.kind {
            NodeKind::Root => None,
            NodeKind::Comment => {
                // Column-1 banners (`/*! … */`) survive into the output;
                // every other comment is dropped.
                if node.span.column == 1 && node.text.starts_with("/*!") {
                    Some(Fragment::Emit(vec![
                        Instruction::OpenRule(Template::new(&node.text)),
                        Instruction::CloseRule,
                    ]))
                } else {
                    Some(Fragment::Discard)
                }
            }
            NodeKind::Declaration => {
                let key = node.key.clone().unwrap_or_default();
                let mut value = node.value.clone().unwrap_or_default();
                if value.ends_with(';') {
                    value.pop();
                }
                Some(Fragment::Emit(vec![Instruction::SetDeclaration {
                    key: Template::new(key),
                    value: Template::new(value),
                }]))
            }
            NodeKind::Pending => {
                let name = Template::new(&node.text);
                if node.children.is_empty() {
                    Some(Fragment::Emit(vec![
                        Instruction::OpenRule(name),
                        Instruction::CloseRule,
                    ]))
                } else {
                    Some(Fragment::Emit(vec![
                        Instruction::OpenRule(name),
                        Instruction::Nested,
                        Instruction::CloseRule,
                    ]))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn builtins() -> Vec<Box<dyn Plugin>> {
        vec![Box::new(ScriptPlugin), Box::new(StylePlugin)]
    }

    fn compiled(src: &str) -> Program {
        let root = parse(src).unwrap();
        compile(&root, &builtins(), &CompileOptions::default()).unwrap()
    }

    #[test]
    fn rule_with_declaration() {
        assert_eq!(
            compiled("div\n color: red"),
            Program(vec![
                Instruction::OpenRule("div".into()),
                Instruction::SetDeclaration {
                    key: "color".into(),
                    value: "red".into(),
                },
                Instruction::CloseRule,
            ])
        );
    }

    #[test]
    fn childless_rule() {
        assert_eq!(
            compiled("div"),
            Program(vec![
                Instruction::OpenRule("div".into()),
                Instruction::CloseRule,
            ])
        );
    }

    #[test]
    fn trailing_semicolon_is_stripped_from_values() {
        assert_eq!(
            compiled("div\n color: red;"),
            Program(vec![
                Instruction::OpenRule("div".into()),
                Instruction::SetDeclaration {
                    key: "color".into(),
                    value: "red".into(),
                },
                Instruction::CloseRule,
            ])
        );
    }

    #[test]
    fn comments_are_dropped_banners_kept() {
        assert_eq!(compiled("// note\ndiv").0.len(), 2);
        assert_eq!(
            compiled("/*! banner */\ndiv"),
            Program(vec![
                Instruction::OpenRule("/*! banner */".into()),
                Instruction::CloseRule,
                Instruction::OpenRule("div".into()),
                Instruction::CloseRule,
            ])
        );
    }

    #[test]
    fn if_line_wraps_children() {
        assert_eq!(
            compiled("if (b){...}\n ${b}\n  color: red"),
            Program(vec![Instruction::RawControlFlow {
                text: "if (b)".to_string(),
                body: Program(vec![
                    Instruction::OpenRule("${b}".into()),
                    Instruction::SetDeclaration {
                        key: "color".into(),
                        value: "red".into(),
                    },
                    Instruction::CloseRule,
                ]),
            }])
        );
    }

    #[test]
    fn each_line_claims_declarative_form() {
        assert_eq!(
            compiled("div\n each v,k of items\n  color: ${v}"),
            Program(vec![
                Instruction::OpenRule("div".into()),
                Instruction::EachLoop {
                    collection: "items".to_string(),
                    value: "v".to_string(),
                    key: Some("k".to_string()),
                    body: Program(vec![Instruction::SetDeclaration {
                        key: "color".into(),
                        value: "${v}".into(),
                    }]),
                },
                Instruction::CloseRule,
            ])
        );
    }

    #[test]
    fn malformed_each_falls_through_to_rule() {
        assert_eq!(
            compiled("each and every"),
            Program(vec![
                Instruction::OpenRule("each and every".into()),
                Instruction::CloseRule,
            ])
        );
    }

    #[test]
    fn let_line_scopes_its_children() {
        assert_eq!(
            compiled("let s=1;\n ${s}\n  color: red"),
            Program(vec![Instruction::LetBinding {
                pattern: "s".to_string(),
                expr: "1".to_string(),
                body: Program(vec![
                    Instruction::OpenRule("${s}".into()),
                    Instruction::SetDeclaration {
                        key: "color".into(),
                        value: "red".into(),
                    },
                    Instruction::CloseRule,
                ]),
            }])
        );
    }

    #[test]
    fn unclaimed_nodes_drop_their_subtree() {
        let root = parse("mystery\n color: red").unwrap();
        let only_scripts: Vec<Box<dyn Plugin>> = vec![Box::new(ScriptPlugin)];
        let program = compile(&root, &only_scripts, &CompileOptions::default()).unwrap();
        assert!(program.is_empty());
    }

    struct BadPlugin {
        holes: usize,
    }

    impl Plugin for BadPlugin {
        fn try_compile(
            &self,
            _node: &Node,
            _options: &CompileOptions,
            _index: usize,
            _siblings: &[Node],
        ) -> Option<Fragment> {
            Some(Fragment::Emit(vec![Instruction::Nested; self.holes]))
        }
    }

    #[test]
    fn two_placeholders_is_an_error() {
        let root = parse("div\n color: red").unwrap();
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(BadPlugin { holes: 2 })];
        let err = compile(&root, &plugins, &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, Error::TooManyPlaceholders(_)), "{err}");
    }

    #[test]
    fn placeholder_on_childless_node_is_an_error() {
        let root = parse("div").unwrap();
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(BadPlugin { holes: 1 })];
        let err = compile(&root, &plugins, &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyNodePlaceholder(_)), "{err}");
    }
}
