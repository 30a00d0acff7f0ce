//! MinLang Compiler CLI
//!
//! The `minc` command is the main entry point for the MinLang compiler.

use clap::{Parser, Subcommand};
use minlang::{codegen, diag::Diagnostic, ir, lexer, parser, sema, vm::Vm};
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "minc")]
#[command(version = minlang::VERSION)]
#[command(about = "The MinLang Compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a MinLang source file
    Build {
        /// Input file to compile
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Write the generated code listing to this file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Emit tokens (for debugging)
        #[arg(long)]
        emit_tokens: bool,

        /// Emit AST (for debugging)
        #[arg(long)]
        emit_ast: bool,

        /// Emit three-address code (for debugging)
        #[arg(long)]
        emit_ir: bool,

        /// Skip the optimization passes
        #[arg(long)]
        no_opt: bool,

        /// Execute the compiled program
        #[arg(long)]
        run: bool,
    },

    /// Check a file for errors without generating code
    Check {
        /// Input file to check
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Tokenize a file and print tokens
    Tokenize {
        /// Input file to tokenize
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Parse a file and print the AST
    Parse {
        /// Input file to parse
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn read_source(path: &PathBuf) -> miette::Result<String> {
    fs::read_to_string(path).map_err(|e| miette::miette!("failed to read {}: {}", path.display(), e))
}

fn report(diagnostics: &[Diagnostic]) -> miette::Report {
    for d in diagnostics {
        eprintln!("{}", d);
    }
    miette::miette!("found {} error(s)", diagnostics.len())
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            emit_tokens,
            emit_ast,
            emit_ir,
            no_opt,
            run,
        } => {
            let source = read_source(&input)?;

            if emit_tokens {
                println!("=== Tokens ===");
                let (tokens, errors) = lexer::lex(&source);
                for token in &tokens {
                    println!("{:?} @ {} = {:?}", token.kind, token.span, token.text(&source));
                }
                if !errors.is_empty() {
                    println!("\nLexer errors: {:?}", errors);
                }
            }

            let (program, parse_errors) = parser::parse(&source);
            if emit_ast {
                println!("=== AST ===");
                println!("{:#?}", program);
            }
            if !parse_errors.is_empty() {
                let diagnostics: Vec<_> = parse_errors
                    .iter()
                    .map(|e| Diagnostic::syntax(&source, e))
                    .collect();
                return Err(report(&diagnostics));
            }

            let analysis = match sema::analyze(&program) {
                Ok(analysis) => analysis,
                Err(errors) => {
                    let diagnostics: Vec<_> = errors
                        .iter()
                        .map(|e| Diagnostic::semantic(&source, e))
                        .collect();
                    return Err(report(&diagnostics));
                }
            };

            let mut tac = ir::lower(&program, &analysis);
            if !no_opt {
                tac = ir::optimize(&tac);
            }
            if emit_ir {
                println!("=== Three-address code ===");
                println!("{}", tac);
            }

            let image = codegen::generate(&tac);

            if let Some(path) = &output {
                fs::write(path, format!("{}", image))
                    .map_err(|e| miette::miette!("failed to write {}: {}", path.display(), e))?;
                println!("Wrote {} instructions to {}", image.instrs.len(), path.display());
            }

            if run {
                let stdin = io::stdin();
                let stdout = io::stdout();
                let mut vm = Vm::new();
                vm.run(&image, &mut stdin.lock(), &mut stdout.lock())
                    .map_err(|e| miette::miette!("runtime error: {}", e))?;
            } else if output.is_none() {
                println!("{}", image);
            }

            Ok(())
        }

        Commands::Check { input } => {
            let source = read_source(&input)?;

            let (program, parse_errors) = parser::parse(&source);
            if !parse_errors.is_empty() {
                let diagnostics: Vec<_> = parse_errors
                    .iter()
                    .map(|e| Diagnostic::syntax(&source, e))
                    .collect();
                return Err(report(&diagnostics));
            }

            match sema::analyze(&program) {
                Ok(_) => {
                    println!("No errors found in {}", input.display());
                    Ok(())
                }
                Err(errors) => {
                    let diagnostics: Vec<_> = errors
                        .iter()
                        .map(|e| Diagnostic::semantic(&source, e))
                        .collect();
                    Err(report(&diagnostics))
                }
            }
        }

        Commands::Tokenize { input } => {
            let source = read_source(&input)?;
            let (tokens, errors) = lexer::lex(&source);

            for token in &tokens {
                println!(
                    "{:>4}..{:<4} {:16} {:?}",
                    token.span.start,
                    token.span.end,
                    format!("{:?}", token.kind),
                    token.text(&source)
                );
            }

            if !errors.is_empty() {
                eprintln!("\nLexer errors:");
                for err in errors {
                    eprintln!("  {:?}", err);
                }
            }

            Ok(())
        }

        Commands::Parse { input } => {
            let source = read_source(&input)?;
            let (program, errors) = parser::parse(&source);

            println!("{:#?}", program);

            if !errors.is_empty() {
                eprintln!("\nParser errors:");
                for err in &errors {
                    let d = Diagnostic::syntax(&source, err);
                    eprintln!("  {}", d);
                }
            }

            Ok(())
        }
    }
}
