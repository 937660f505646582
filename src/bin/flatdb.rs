//! FlatDB - command-line entry point
//!
//! Two verbs: `build` compiles a source file into a program file, `run`
//! executes a compiled program against the `DB/` tree.

use std::env;

use anyhow::Context;

use flatdb::executor::Executor;
use flatdb::lang::parser;
use flatdb::storage::DEFAULT_DB_ROOT;

fn print_usage() {
    eprintln!(
        r#"Usage:
  flatdb build <sourceFile> <programFile>   Compile a source file
  flatdb run <programFile>                  Execute a compiled program"#
    );
}

fn build(source_path: &str, program_path: &str) -> anyhow::Result<i32> {
    let result = parser::compile_source_file(source_path)
        .with_context(|| format!("could not scan '{}'", source_path))?;

    for warning in result.diagnostics.warnings() {
        eprintln!("{}", warning);
    }

    if result.diagnostics.has_errors() {
        eprintln!("{} error(s) generated.", result.diagnostics.error_count());
        for error in result.diagnostics.errors() {
            eprintln!("{}", error);
        }
        eprintln!("Build failed");
        return Ok(1);
    }

    let program = result
        .program
        .expect("program present when no errors were recorded");
    program
        .store(program_path)
        .with_context(|| format!("could not write program file '{}'", program_path))?;

    println!("Build successful!");
    Ok(0)
}

fn run(program_path: &str) -> anyhow::Result<i32> {
    let mut executor = Executor::new(DEFAULT_DB_ROOT);
    executor
        .execute_file(program_path)
        .with_context(|| format!("execution of '{}' failed", program_path))?;
    Ok(0)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();

    let outcome = match args.get(1).map(String::as_str) {
        Some("build") => match (args.get(2), args.get(3)) {
            (Some(source), Some(program)) => build(source, program),
            _ => {
                print_usage();
                Ok(1)
            }
        },
        Some("run") => match args.get(2) {
            Some(program) => run(program),
            None => {
                print_usage();
                Ok(1)
            }
        },
        _ => {
            print_usage();
            Ok(1)
        }
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            std::process::exit(1);
        }
    }
}
