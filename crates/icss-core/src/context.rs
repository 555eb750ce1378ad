use indexmap::IndexMap;

use crate::emitter;
use crate::error::{Error, Result};

pub type RuleId = usize;

/// Declarations of a rule: unset, an ordered key/value map, or (for
/// at-rules only) an ordered sequence of nested rules. Once a rule's
/// declarations take one shape they never take the other.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Decls {
    #[default]
    None,
    Map(IndexMap<String, String>),
    Rules(Vec<RuleId>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub decls: Decls,
}

#[derive(Debug, Clone, Copy)]
enum Cursor {
    Top,
    Nested(RuleId),
}

enum Frame {
    Rule(RuleId),
    Cursor(Cursor),
}

/// Receiver for [`Context::replay`]. Returning `false` from any callback
/// stops the walk.
pub trait RuleSink {
    fn open(&mut self, name: &str) -> bool;
    fn close(&mut self) -> bool;
    fn decl(&mut self, key: &str, value: &str) -> bool;
}

/// Stack machine building a rule tree from `open`/`close`/`decl` calls.
///
/// Rules live in an arena addressed by index. The navigation stack
/// holds saved rule frames, plus a saved sequence cursor whenever an
/// at-rule becomes a container, so `close` can restore both.
#[derive(Default)]
pub struct Context {
    arena: Vec<Rule>,
    top: Vec<RuleId>,
    current: Option<RuleId>,
    stack: Vec<Frame>,
    cursor: Cursor,
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor::Top
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a rule, substituting every `&` in `name` with the enclosing
    /// rule's current name. Must be paired with [`Context::close`].
    ///
    /// If the enclosing rule has no declarations yet, opening inside it
    /// either promotes it to an at-rule container (`@` names: subsequent
    /// siblings accumulate inside it) or, for a non-comment rule still
    /// sitting last in the active sequence, removes it as a superseded
    /// `&`-continuation placeholder.
    pub fn open(&mut self, name: &str) -> &mut Self {
        let mut name = name.to_string();
        if let Some(cur) = self.current {
            self.stack.push(Frame::Rule(cur));
            if name.contains('&') {
                name = name.replace('&', &self.arena[cur].name);
            }
            if self.arena[cur].decls == Decls::None {
                if self.arena[cur].name.starts_with('@') {
                    self.arena[cur].decls = Decls::Rules(Vec::new());
                    self.stack.push(Frame::Cursor(self.cursor));
                    self.cursor = Cursor::Nested(cur);
                } else if !self.arena[cur].name.starts_with('/')
                    && self.active_seq().last() == Some(&cur)
                {
                    self.active_seq_mut().pop();
                }
            }
        }
        let id = self.arena.len();
        self.arena.push(Rule {
            name,
            decls: Decls::None,
        });
        self.active_seq_mut().push(id);
        self.current = Some(id);
        self
    }

    /// Close the current rule. Popping a saved sequence cursor restores
    /// it and pops once more for the enclosing rule itself.
    pub fn close(&mut self) -> &mut Self {
        match self.stack.pop() {
            Some(Frame::Rule(id)) => self.current = Some(id),
            Some(Frame::Cursor(cursor)) => {
                self.cursor = cursor;
                return self.close();
            }
            None => self.current = None,
        }
        self
    }

    /// Current rule name, or `""` when no rule is open.
    pub fn name(&self) -> &str {
        self.current
            .map(|id| self.arena[id].name.as_str())
            .unwrap_or("")
    }

    /// Set or read a declaration on the current rule.
    ///
    /// A non-empty `value` stores (creating the map lazily) and returns
    /// it; an absent or empty value reads, returning `""` when unset.
    pub fn decl(&mut self, key: &str, value: Option<&str>) -> Result<String> {
        let Some(cur) = self.current else {
            return Err(Error::DeclOutsideRule {
                key: key.to_string(),
            });
        };
        match value.filter(|v| !v.is_empty()) {
            Some(value) => {
                let rule = &mut self.arena[cur];
                match &mut rule.decls {
                    Decls::None => {
                        let mut map = IndexMap::new();
                        map.insert(key.to_string(), value.to_string());
                        rule.decls = Decls::Map(map);
                    }
                    Decls::Map(map) => {
                        map.insert(key.to_string(), value.to_string());
                    }
                    Decls::Rules(_) => {
                        return Err(Error::IllegalDeclarationShape {
                            name: rule.name.clone(),
                        });
                    }
                }
                Ok(value.to_string())
            }
            None => match &self.arena[cur].decls {
                Decls::Map(map) => Ok(map.get(key).cloned().unwrap_or_default()),
                _ => Ok(String::new()),
            },
        }
    }

    /// Iterate `(key, value)` pairs, calling `f(context, value, key)`.
    pub fn each<K, V, I, F>(&mut self, items: I, mut f: F) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        F: FnMut(&mut Self, V, K),
    {
        for (key, value) in items {
            f(self, value, key);
        }
        self
    }

    /// Open-stack depth; zero after every balanced program.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Serialize the finished rule tree to CSS.
    pub fn to_css(&self) -> Result<String> {
        emitter::emit_css(self)
    }

    /// Walk the finished rule tree against a sink. Returns whether the
    /// walk ran to completion.
    pub fn replay<S: RuleSink>(&self, sink: &mut S) -> Result<bool> {
        for &id in &self.top {
            if !self.replay_rule(id, sink)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn replay_rule<S: RuleSink>(&self, id: RuleId, sink: &mut S) -> Result<bool> {
        let rule = &self.arena[id];
        match &rule.decls {
            Decls::Map(map) => {
                if !sink.open(&rule.name) {
                    return Ok(false);
                }
                for (key, value) in map {
                    if !sink.decl(key, value) {
                        return Ok(false);
                    }
                }
            }
            Decls::Rules(seq) => {
                if !sink.open(&rule.name) {
                    return Ok(false);
                }
                for &child in seq {
                    if !self.replay_rule(child, sink)? {
                        return Ok(false);
                    }
                }
            }
            Decls::None => {
                if rule.name.starts_with('/') || rule.name.starts_with('@') {
                    if !sink.open(&rule.name) {
                        return Ok(false);
                    }
                } else {
                    return Err(Error::UnexpectedBareRule {
                        name: rule.name.clone(),
                    });
                }
            }
        }
        Ok(sink.close())
    }

    pub(crate) fn rule(&self, id: RuleId) -> &Rule {
        &self.arena[id]
    }

    pub(crate) fn top(&self) -> &[RuleId] {
        &self.top
    }

    fn active_seq(&self) -> &Vec<RuleId> {
        match self.cursor {
            Cursor::Top => &self.top,
            Cursor::Nested(id) => match &self.arena[id].decls {
                Decls::Rules(seq) => seq,
                _ => unreachable!("cursor targets an at-rule sequence"),
            },
        }
    }

    fn active_seq_mut(&mut self) -> &mut Vec<RuleId> {
        match self.cursor {
            Cursor::Top => &mut self.top,
            Cursor::Nested(id) => match &mut self.arena[id].decls {
                Decls::Rules(seq) => seq,
                _ => unreachable!("cursor targets an at-rule sequence"),
            },
        }
    }
}
