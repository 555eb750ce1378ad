use std::fmt;

/// Text that may carry `${…}` interpolation, resolved by the host
/// evaluator when the instruction runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template(String);

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_interpolated(&self) -> bool {
        self.0.contains("${")
    }
}

impl From<&str> for Template {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One compiled instruction.
///
/// `Nested` is the children placeholder: it only appears inside plugin
/// fragments and is spliced away during compilation; a finished program
/// never contains it.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    OpenRule(Template),
    CloseRule,
    SetDeclaration {
        key: Template,
        value: Template,
    },
    /// Host-evaluated guard wrapping a body, e.g. `if (cond)`.
    RawControlFlow {
        text: String,
        body: Program,
    },
    EachLoop {
        collection: String,
        value: String,
        key: Option<String>,
        body: Program,
    },
    LetBinding {
        pattern: String,
        expr: String,
        body: Program,
    },
    Nested,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program(pub Vec<Instruction>);

impl Program {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Instruction-text rendering: the sequence of `open`/`close`/`decl`/
    /// `each` calls against a context parameter named `ctx`. Adjacent
    /// open/close pairs fuse into a single chained call; interpolated
    /// templates quote with backticks, literal ones with single quotes.
    pub fn to_source(&self, ctx: &str) -> String {
        let mut out = String::new();
        write_program(&self.0, ctx, &mut out);
        out
    }
}

fn write_program(instructions: &[Instruction], ctx: &str, out: &mut String) {
    use std::fmt::Write;

    let mut i = 0;
    while i < instructions.len() {
        match &instructions[i] {
            Instruction::OpenRule(name)
                if matches!(instructions.get(i + 1), Some(Instruction::CloseRule)) =>
            {
                let _ = writeln!(out, "{ctx}.open({}).close();", quote(name));
                i += 2;
                continue;
            }
            Instruction::OpenRule(name) => {
                let _ = writeln!(out, "{ctx}.open({});", quote(name));
            }
            Instruction::CloseRule => {
                let _ = writeln!(out, "{ctx}.close();");
            }
            Instruction::SetDeclaration { key, value } => {
                let _ = writeln!(out, "{ctx}.decl({},{});", quote(key), quote(value));
            }
            Instruction::RawControlFlow { text, body } => {
                let _ = writeln!(out, "{text} {{");
                write_program(&body.0, ctx, out);
                out.push_str("}\n");
            }
            Instruction::EachLoop {
                collection,
                value,
                key,
                body,
            } => {
                match key {
                    Some(key) => {
                        let _ = writeln!(out, "{ctx}.each({collection}, ({value}, {key}) => {{");
                    }
                    None => {
                        let _ = writeln!(out, "{ctx}.each({collection}, ({value}) => {{");
                    }
                }
                write_program(&body.0, ctx, out);
                out.push_str("});\n");
            }
            Instruction::LetBinding {
                pattern,
                expr,
                body,
            } => {
                let _ = writeln!(out, "let {pattern} = {expr};");
                write_program(&body.0, ctx, out);
            }
            Instruction::Nested => out.push_str("...\n"),
        }
        i += 1;
    }
}

fn quote(template: &Template) -> String {
    if template.is_interpolated() {
        format!("`{template}`")
    } else {
        format!("'{template}'")
    }
}
