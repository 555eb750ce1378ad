use tracing::debug;

use crate::ast::Node;
use crate::compiler::{self, CompileOptions, Plugin, ScriptPlugin, StylePlugin};
use crate::context::Context;
use crate::error::Result;
use crate::ir::Program;
use crate::parser;
use crate::runtime::{self, Eval, Scope};

fn builtin_plugins() -> Vec<Box<dyn Plugin>> {
    vec![Box::new(ScriptPlugin), Box::new(StylePlugin)]
}

/// A configured preprocessor: an ordered plugin list plus compile
/// options. Construct once, use for any number of documents.
pub struct Pipeline {
    plugins: Vec<Box<dyn Plugin>>,
    options: CompileOptions,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// The built-in pipeline: control-flow plugin, then the default
    /// declaration/comment/rule plugin.
    pub fn new() -> Self {
        Self::with_plugins(Vec::new())
    }

    /// A pipeline with a caller-supplied plugin list. An empty list
    /// falls back to the built-ins.
    pub fn with_plugins(plugins: Vec<Box<dyn Plugin>>) -> Self {
        let plugins = if plugins.is_empty() {
            builtin_plugins()
        } else {
            plugins
        };
        Self {
            plugins,
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Append a plugin after the current list.
    pub fn with_plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn parse(&self, source: &str) -> Result<Node> {
        parser::parse(source)
    }

    pub fn compile(&self, root: &Node) -> Result<Program> {
        compiler::compile(root, &self.plugins, &self.options)
    }

    /// Parse and compile in one step.
    pub fn process(&self, source: &str) -> Result<Program> {
        self.compile(&self.parse(source)?)
    }

    /// Compile to instruction text for a host evaluator.
    pub fn compile_to_source(&self, source: &str) -> Result<String> {
        Ok(self.process(source)?.to_source(&self.options.ctx_name))
    }

    /// Process and execute against a fresh context.
    pub fn run(&self, source: &str, eval: &mut dyn Eval) -> Result<Context> {
        let mut ctx = Context::new();
        self.run_with(source, &mut ctx, eval)?;
        Ok(ctx)
    }

    /// Process and execute against a caller-supplied context.
    pub fn run_with(&self, source: &str, ctx: &mut Context, eval: &mut dyn Eval) -> Result<()> {
        let program = self.process(source)?;
        runtime::run(&program, ctx, eval)?;
        debug!(depth = ctx.depth(), "executed program");
        Ok(())
    }

    /// Render a document to CSS with a fresh default scope.
    pub fn render(&self, source: &str) -> Result<String> {
        let mut scope = Scope::new();
        self.run(source, &mut scope)?.to_css()
    }
}
