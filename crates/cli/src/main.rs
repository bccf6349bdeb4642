//! This is the CLI driver for the formula language compiler. For more detail,
//! please see the documentation for the [`flc_compiler`] crate.
//!
//! # Usage
//!
//! ```bash
//! # Compile a formula over a money parameter to Java
//! flc compile "MAX(premium; 10EUR)" -p premium:Money -e Money
//!
//! # Compute the value of a formula
//! flc eval "premium * 1.5" -p premium:Money=20EUR
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming
#![allow(clippy::multiple_crate_versions)] // Enforced by our dependencies

use std::sync::Arc;

use anyhow::bail;
use ariadne::Source;
use clap::{ArgAction, Args, Parser, Subcommand};
use flc_compiler::{
    compile::parameter::ParameterTable,
    datatype::Datatype,
    environment::Environment,
    eval::{value::Value, Bindings, Evaluator},
    CompilerBuilder,
};
use flc_errors::{compile, diagnostic::MessageList, eval};
use itertools::Itertools;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "flc", version, about = "Compiles and evaluates formula language expressions")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging (use twice for tracing output)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile a formula to a Java source fragment
    Compile(CompileArgs),

    /// Compute the value of a formula
    Eval(EvalArgs),
}

#[derive(Debug, Args)]
struct CompileArgs {
    /// The formula to compile
    expression: String,

    /// A parameter of the formula, written as `name:Type`
    #[arg(short = 'p', long = "param", value_parser = parse_declaration)]
    parameters: Vec<(String, Datatype)>,

    /// The datatype the formula has to produce
    #[arg(short, long, default_value = "any", value_parser = parse_datatype)]
    expected: Datatype,

    /// Box results of a primitive datatype
    #[arg(long)]
    ensure_object: bool,
}

#[derive(Debug, Args)]
struct EvalArgs {
    /// The formula to evaluate
    expression: String,

    /// A parameter of the formula, written as `name:Type=value`, or as
    /// `name:Type` to leave it null
    #[arg(short = 'p', long = "param", value_parser = parse_binding)]
    parameters: Vec<Binding>,
}

/// A parameter declaration from the command line, with its value if it has
/// one.
#[derive(Clone, Debug)]
struct Binding {
    name:     String,
    datatype: Datatype,
    value:    Option<Value>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Command::Compile(args) => compile_command(args),
        Command::Eval(args) => eval_command(args),
    }
}

fn setup_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn compile_command(args: CompileArgs) -> anyhow::Result<()> {
    let compiler = CompilerBuilder::new(Arc::new(Environment::default()))
        .with_ensure_result_is_object(args.ensure_object)
        .build();
    let parameters = args.parameters.into_iter().collect::<ParameterTable>();
    debug!(parameters = parameters.len(), "compiling from the command line");

    let result = compiler.compile(&args.expression, &parameters, &args.expected);
    report(&args.expression, result.messages())?;
    if result.failed() {
        bail!("The formula does not compile");
    }

    if let Some(fragment) = result.fragment() {
        let imports = fragment.import_declarations();
        if !imports.is_empty() {
            println!("{imports}\n");
        }
        println!("{fragment}");
    }
    if let Some(datatype) = result.datatype() {
        println!("// datatype: {datatype}");
    }
    if !result.identifiers().is_empty() {
        println!("// parameters used: {}", result.identifiers().iter().join(", "));
    }

    Ok(())
}

fn eval_command(args: EvalArgs) -> anyhow::Result<()> {
    let evaluator = Evaluator::new(Arc::new(Environment::default()));

    let mut parameters = ParameterTable::new();
    let mut bindings = Bindings::new();
    for binding in args.parameters {
        parameters.add(&binding.name, binding.datatype);
        if let Some(value) = binding.value {
            bindings.insert(binding.name, value);
        }
    }

    match evaluator.evaluate(&args.expression, &parameters, &bindings) {
        Ok(value) => {
            println!("{value}");
            Ok(())
        }
        Err(eval::Error::Compilation(messages)) => {
            report(&args.expression, &messages)?;
            bail!("The formula does not compile")
        }
        Err(error) => Err(error.into()),
    }
}

/// Prints every message about the formula `source` to standard error.
fn report(source: &str, messages: &MessageList) -> anyhow::Result<()> {
    for message in messages {
        message.report().eprint(Source::from(source))?;
    }
    Ok(())
}

fn parse_datatype(text: &str) -> Result<Datatype, compile::Error> {
    text.parse()
}

/// Parses `name:Type`.
fn parse_declaration(text: &str) -> anyhow::Result<(String, Datatype)> {
    let Some((name, datatype)) = text.split_once(':') else {
        bail!("Expected `name:Type` but found `{text}`");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("The parameter in `{text}` has no name");
    }
    Ok((name.to_string(), datatype.parse()?))
}

/// Parses `name:Type=value` or `name:Type`.
fn parse_binding(text: &str) -> anyhow::Result<Binding> {
    let (declaration, value) = match text.split_once('=') {
        Some((declaration, value)) => (declaration, Some(value)),
        None => (text, None),
    };
    let (name, datatype) = parse_declaration(declaration)?;
    let value = value.map(|value| Value::parse(&datatype, value)).transpose()?;
    Ok(Binding {
        name,
        datatype,
        value,
    })
}

#[cfg(test)]
mod test {
    use flc_compiler::{datatype::Datatype, eval::value::Value};

    use crate::{parse_binding, parse_declaration};

    #[test]
    fn declarations_name_a_datatype() -> anyhow::Result<()> {
        let (name, datatype) = parse_declaration("values:List<Decimal>")?;
        assert_eq!(name, "values");
        assert_eq!(datatype, Datatype::make_list(Datatype::Decimal));

        assert!(parse_declaration("values").is_err());
        assert!(parse_declaration(":int").is_err());
        assert!(parse_declaration("x:Float").is_err());

        Ok(())
    }

    #[test]
    fn bindings_may_carry_a_value() -> anyhow::Result<()> {
        let binding = parse_binding("n:int=42")?;
        assert_eq!(binding.value, Some(Value::Integer(42)));

        let binding = parse_binding("d:Decimal")?;
        assert_eq!(binding.datatype, Datatype::Decimal);
        assert_eq!(binding.value, None);

        assert!(parse_binding("n:int=forty").is_err());

        Ok(())
    }
}
