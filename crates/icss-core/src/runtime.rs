use indexmap::IndexMap;
use tracing::trace;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::ir::{Instruction, Program};

/// A host value visible to templates, guards and loops.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Rendering used by `${…}` substitution.
    pub fn text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::text)
                .collect::<Vec<_>>()
                .join(","),
            Value::Map(map) => map.keys().cloned().collect::<Vec<_>>().join(","),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Str(s) => !s.is_empty() && s != "false" && s != "0",
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Str(String::new()),
            serde_json::Value::Bool(b) => Value::Str(b.to_string()),
            serde_json::Value::Number(n) => Value::Str(n.to_string()),
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Parse a JSON object into evaluator bindings, keeping author order.
pub fn bindings_from_json(text: &str) -> Result<IndexMap<String, Value>> {
    let parsed: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(text).map_err(|err| Error::MalformedBinding {
            text: err.to_string(),
        })?;
    Ok(parsed.into_iter().map(|(k, v)| (k, v.into())).collect())
}

/// Expression-evaluator capability injected into the interpreter.
///
/// Interpolation, guard truthiness, collection lookup and binding
/// patterns all sit behind this trait, so the instruction set stays
/// language-neutral.
pub trait Eval {
    fn render(&mut self, template: &str) -> Result<String>;
    fn truthy(&mut self, guard: &str) -> Result<bool>;
    fn collection(&mut self, expr: &str) -> Result<Vec<(String, Value)>>;
    fn bind(&mut self, pattern: &str, expr: &str) -> Result<()>;
    fn define(&mut self, name: &str, value: Value);
    fn enter(&mut self);
    fn exit(&mut self);
}

/// Execute a compiled program against a rule context.
pub fn run(program: &Program, ctx: &mut Context, eval: &mut dyn Eval) -> Result<()> {
    for inst in &program.0 {
        match inst {
            Instruction::OpenRule(name) => {
                let name = eval.render(name.as_str())?;
                ctx.open(&name);
            }
            Instruction::CloseRule => {
                ctx.close();
            }
            Instruction::SetDeclaration { key, value } => {
                let key = eval.render(key.as_str())?;
                let value = eval.render(value.as_str())?;
                ctx.decl(&key, Some(&value))?;
            }
            Instruction::RawControlFlow { text, body } => {
                if eval.truthy(text)? {
                    eval.enter();
                    let result = run(body, ctx, eval);
                    eval.exit();
                    result?;
                }
            }
            Instruction::EachLoop {
                collection,
                value,
                key,
                body,
            } => {
                for (item_key, item) in eval.collection(collection)? {
                    eval.enter();
                    eval.define(value, item);
                    if let Some(key_name) = key {
                        eval.define(key_name, Value::Str(item_key));
                    }
                    let result = run(body, ctx, eval);
                    eval.exit();
                    result?;
                }
            }
            Instruction::LetBinding {
                pattern,
                expr,
                body,
            } => {
                eval.enter();
                let result = match eval.bind(pattern, expr) {
                    Ok(()) => run(body, ctx, eval),
                    Err(err) => Err(err),
                };
                eval.exit();
                result?;
            }
            Instruction::Nested => return Err(Error::UnresolvedPlaceholder),
        }
    }
    Ok(())
}

/// Default evaluator: a stack of ordered binding frames with a small
/// expression language: string and number literals, `[…]` lists, and
/// dotted lookup paths (map keys, numeric list indices).
pub struct Scope {
    frames: Vec<IndexMap<String, Value>>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self {
            frames: vec![IndexMap::new()],
        }
    }

    pub fn with_bindings(bindings: IndexMap<String, Value>) -> Self {
        Self {
            frames: vec![bindings],
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(Self::with_bindings(bindings_from_json(text)?))
    }

    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut value = self
            .frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(first))?
            .clone();
        for segment in segments {
            value = match &value {
                Value::Map(map) => map.get(segment)?.clone(),
                Value::List(items) => items.get(segment.parse::<usize>().ok()?)?.clone(),
                Value::Str(_) => return None,
            };
        }
        Some(value)
    }

    fn eval_expr(&self, expr: &str) -> Result<Value> {
        let expr = expr.trim();
        if expr.len() >= 2 {
            let bytes = expr.as_bytes();
            if (bytes[0] == b'\'' && bytes[expr.len() - 1] == b'\'')
                || (bytes[0] == b'"' && bytes[expr.len() - 1] == b'"')
            {
                return Ok(Value::Str(expr[1..expr.len() - 1].to_string()));
            }
        }
        if let Some(inner) = expr.strip_prefix('[').and_then(|e| e.strip_suffix(']')) {
            let items = inner
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| self.eval_expr(item))
                .collect::<Result<Vec<Value>>>()?;
            return Ok(Value::List(items));
        }
        if expr.parse::<f64>().is_ok() || expr == "true" || expr == "false" {
            return Ok(Value::Str(expr.to_string()));
        }
        self.lookup(expr).ok_or_else(|| Error::UnknownBinding {
            name: expr.to_string(),
        })
    }
}

impl Eval for Scope {
    fn render(&mut self, template: &str) -> Result<String> {
        let mut out = String::new();
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(Error::MalformedTemplate {
                    text: template.to_string(),
                });
            };
            out.push_str(&self.eval_expr(&after[..end])?.text());
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    fn truthy(&mut self, guard: &str) -> Result<bool> {
        let mut expr = guard.trim();
        if let Some(rest) = expr.strip_prefix("if") {
            if rest.starts_with('(') || rest.starts_with(char::is_whitespace) {
                expr = rest.trim_start();
            }
        }
        while expr.starts_with('(') && expr.ends_with(')') && expr.len() >= 2 {
            expr = expr[1..expr.len() - 1].trim();
        }
        if let Some(negated) = expr.strip_prefix('!') {
            return Ok(!self.eval_expr(negated.trim())?.truthy());
        }
        Ok(self.eval_expr(expr)?.truthy())
    }

    fn collection(&mut self, expr: &str) -> Result<Vec<(String, Value)>> {
        match self.eval_expr(expr)? {
            Value::List(items) => Ok(items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), item))
                .collect()),
            Value::Map(map) => Ok(map.into_iter().collect()),
            Value::Str(_) => Err(Error::NotIterable {
                expr: expr.to_string(),
            }),
        }
    }

    fn bind(&mut self, pattern: &str, expr: &str) -> Result<()> {
        let value = self.eval_expr(expr)?;
        let pattern = pattern.trim();
        if let Some(inner) = pattern.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
            let names: Vec<&str> = inner.split(',').map(str::trim).collect();
            let Value::List(items) = value else {
                return Err(Error::MalformedBinding {
                    text: pattern.to_string(),
                });
            };
            if names.len() > items.len() || names.iter().any(|n| n.is_empty()) {
                return Err(Error::MalformedBinding {
                    text: pattern.to_string(),
                });
            }
            for (name, item) in names.iter().zip(items) {
                self.define(name, item);
            }
        } else {
            self.define(pattern, value);
        }
        Ok(())
    }

    fn define(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    fn enter(&mut self) {
        self.frames.push(IndexMap::new());
        trace!(depth = self.frames.len(), "entered scope");
    }

    fn exit(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }
}
