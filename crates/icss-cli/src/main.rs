mod cli;

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use icss_core::runtime::Scope;
use icss_core::Pipeline;

use cli::{Cli, Commands};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Build {
            input,
            output,
            bindings,
        } => {
            let source = read(&input)?;
            let mut scope = match bindings {
                Some(path) => Scope::from_json(&read(&path)?).map_err(|e| e.to_string())?,
                None => Scope::new(),
            };
            let css = Pipeline::new()
                .run(&source, &mut scope)
                .and_then(|ctx| ctx.to_css())
                .map_err(|e| e.to_string())?;
            match output {
                Some(path) => fs::write(&path, css)
                    .map_err(|e| format!("failed to write {path}: {e}"))?,
                None => print!("{css}"),
            }
        }
        Commands::Fmt { input } => {
            let source = read(&input)?;
            let root = Pipeline::new().parse(&source).map_err(|e| e.to_string())?;
            println!("{}", root.format());
        }
    }
    Ok(())
}

fn read(path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("failed to read {path}: {e}"))
}
