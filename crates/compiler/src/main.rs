//! `velac`: the command-line entry point for the Vela compiler and
//! interpreter. Every subcommand reads a source file (or stdin, if none
//! is given) and runs it through some prefix of the pipeline exposed by
//! the `velac` library crate, printing the stage's output to stdout.
//!
//! Diagnostics and logging both go to stderr, so stdout stays reserved
//! for the artifact a subcommand produces (assembly, IR listings, the
//! interpreted program's own printed output).

use clap::{Parser as ClapParser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use velac::interpreter::Value;
use velac::{CompileError, VelaConfig};

#[derive(ClapParser)]
#[command(name = "velac", version, about = "Compiler and interpreter for the Vela expression language")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program with the tree-walking interpreter.
    Interpret {
        file: Option<PathBuf>,
    },
    /// Print the parsed AST, before typechecking.
    Parse {
        file: Option<PathBuf>,
    },
    /// Typecheck a program and print its type-decorated AST.
    Tc {
        file: Option<PathBuf>,
    },
    /// Print the three-address IR the program lowers to.
    Ir {
        file: Option<PathBuf>,
    },
    /// Print the basic-block flow graph built from the IR.
    Flowgraph {
        file: Option<PathBuf>,
    },
    /// Print reaching-definitions dataflow results over the flow graph.
    Dataflow {
        file: Option<PathBuf>,
    },
    /// Print the generated AT&T assembly.
    Asm {
        file: Option<PathBuf>,
    },
    /// Compile and link a program into an executable.
    Compile {
        file: Option<PathBuf>,
        /// Where to write the linked executable.
        #[arg(short, long, default_value = "out")]
        output: PathBuf,
        /// Override the assembler/linker program (defaults to `$VELAC_CC`
        /// or `cc`).
        #[arg(long)]
        cc: Option<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("velac=info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse().command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), CompileError> {
    match command {
        Commands::Interpret { file } => {
            let (source, name) = read_source(file)?;
            let value = velac::interpret(&source, &name)?;
            print_final_value(&value);
            Ok(())
        }
        Commands::Parse { file } => {
            let (source, name) = read_source(file)?;
            let tokens = velac::lexer::tokenize(&source, &name)?;
            let module = velac::parser::parse(tokens)?;
            println!("{module:#?}");
            Ok(())
        }
        Commands::Tc { file } => {
            let (source, name) = read_source(file)?;
            let module = velac::parse_and_check(&source, &name)?;
            println!("{module:#?}");
            Ok(())
        }
        Commands::Ir { file } => {
            let (source, name) = read_source(file)?;
            let module = velac::parse_and_check(&source, &name)?;
            let ir = velac::generate_ir(&module)?;
            for (function, instructions) in &ir {
                println!("{function}:");
                for instr in instructions {
                    println!("  {instr:?}");
                }
            }
            Ok(())
        }
        Commands::Flowgraph { file } => {
            let (source, name) = read_source(file)?;
            let module = velac::parse_and_check(&source, &name)?;
            let ir = velac::generate_ir(&module)?;
            let graph = velac::flow_graph(&ir);
            for block in &graph.blocks {
                println!("{} [{}]:", block.label, block.function);
                for (step, instr) in &block.instructions {
                    println!("  {step}: {instr:?}");
                }
                if let Some(successors) = graph.edges.get(&block.label) {
                    println!("  -> {}", successors.join(", "));
                }
            }
            Ok(())
        }
        Commands::Dataflow { file } => {
            let (source, name) = read_source(file)?;
            let module = velac::parse_and_check(&source, &name)?;
            let ir = velac::generate_ir(&module)?;
            let graph = velac::flow_graph(&ir);
            let defs = velac::dataflow(&graph);
            for block in &graph.blocks {
                for (step, instr) in &block.instructions {
                    let (inp, outp) = defs.at(*step);
                    println!("{step}: {instr:?}");
                    println!("  in:  {inp:?}");
                    println!("  out: {outp:?}");
                }
            }
            Ok(())
        }
        Commands::Asm { file } => {
            let (source, name) = read_source(file)?;
            let asm = velac::compile_to_assembly(&source, &name)?;
            print!("{asm}");
            Ok(())
        }
        Commands::Compile { file, output, cc } => {
            let (source, name) = read_source(file)?;
            let mut config = VelaConfig::new().with_output(output);
            if let Some(cc) = cc {
                config = config.with_cc(cc);
            }
            velac::compile_to_executable(&source, &name, &config)
        }
    }
}

fn read_source(file: Option<PathBuf>) -> Result<(String, String), CompileError> {
    match file {
        Some(path) => {
            let source = fs::read_to_string(&path)
                .map_err(|e| CompileError::internal(format!("failed to read {}: {e}", path.display())))?;
            let name = path.display().to_string();
            Ok((source, name))
        }
        None => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .map_err(|e| CompileError::internal(format!("failed to read stdin: {e}")))?;
            Ok((source, "<stdin>".to_string()))
        }
    }
}

/// Mirrors the implicit trailing `print_int`/`print_bool` the compiled
/// binary's `main` emits: prints an `Int` or `Bool` result, nothing for
/// `Unit` or a bare pointer.
fn print_final_value(value: &Value) {
    match value {
        Value::Int(v) => println!("{v}"),
        Value::Bool(v) => println!("{v}"),
        Value::Unit | Value::Pointer(_) => {}
    }
}
