use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "icss")]
#[command(about = "Indentation-based CSS preprocessor")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a stylesheet to CSS
    Build {
        input: String,
        #[arg(short, long)]
        output: Option<String>,
        /// JSON object seeding the evaluator bindings
        #[arg(short, long)]
        bindings: Option<String>,
    },
    /// Print the canonical two-space formatting of a stylesheet
    Fmt { input: String },
}
