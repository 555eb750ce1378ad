use crate::context::{Context, Decls, RuleId};
use crate::error::{Error, Result};

/// Serialize a context's rule tree to CSS source.
pub fn emit_css(ctx: &Context) -> Result<String> {
    let mut out = String::new();
    for &id in ctx.top() {
        emit_rule(ctx, id, &mut out)?;
    }
    Ok(out)
}

fn emit_rule(ctx: &Context, id: RuleId, out: &mut String) -> Result<()> {
    let rule = ctx.rule(id);
    match &rule.decls {
        Decls::Map(map) => {
            out.push_str(&rule.name);
            out.push_str(" {\n");
            for (key, value) in map {
                out.push_str(key);
                out.push_str(": ");
                out.push_str(value);
                out.push_str(";\n");
            }
            out.push_str("}\n");
        }
        Decls::Rules(seq) => {
            out.push_str(&rule.name);
            out.push_str(" {\n");
            for &child in seq {
                emit_rule(ctx, child, out)?;
            }
            out.push_str("}\n");
        }
        // Declaration-less leaves: comments verbatim, at-rule
        // definitions as `name;`, anything else is malformed.
        Decls::None => {
            if rule.name.starts_with('/') {
                out.push_str(&rule.name);
                out.push('\n');
            } else if rule.name.starts_with('@') {
                out.push_str(&rule.name);
                out.push_str(";\n");
            } else {
                return Err(Error::UnexpectedBareRule {
                    name: rule.name.clone(),
                });
            }
        }
    }
    Ok(())
}
