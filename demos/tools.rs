//! Declare a few tools and call them the way an agent would.
//!
//! Usage:
//!   cargo run --example tools -- --list
//!   cargo run --example tools -- adder '{"a": 1, "b": 2}'
//!   cargo run --example tools -- search foo
//!   cargo run --example tools            # REPL: `<tool> <input>` per line
//!
//! Ctrl-C or type "exit" / "quit" to leave.

use std::io::{self, BufRead, Write};

use clap::Parser;
use llm_tools::{
    Field, FieldType, HandlerError, ObjectSchema, Tool, ToolError, ToolInput, ToolRegistry,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "tools", about = "Invoke demo tools")]
struct Cli {
    /// Print every tool definition as JSON and exit
    #[arg(long)]
    list: bool,

    /// Tool to invoke; omit to start a REPL
    tool: Option<String>,

    /// Tool input: JSON for structured tools, plain text otherwise
    input: Option<String>,
}

#[derive(Deserialize)]
struct Pair {
    a: f64,
    b: f64,
}

fn pair_schema() -> ObjectSchema {
    ObjectSchema::new()
        .field(Field::required("a", FieldType::Number).with_description("The first number"))
        .field(Field::required("b", FieldType::Number).with_description("The second number"))
}

fn build_registry() -> Result<ToolRegistry, ToolError> {
    let adder = Tool::builder("adder")
        .description("Adds a and b.")
        .schema(pair_schema())
        .func(|input: ToolInput| {
            let Pair { a, b } = input.parse()?;
            Ok::<_, HandlerError>(format!("The sum of {a} and {b} is {}", a + b))
        })
        .build()?;

    let multiply = Tool::builder("multiply")
        .description("Multiply two numbers")
        .schema(pair_schema())
        .async_func(|input: ToolInput| async move {
            let Pair { a, b } = input.parse()?;
            Ok::<_, HandlerError>((a * b).to_string())
        })
        .build()?;

    let search = Tool::builder("search")
        .description("Call the search engine for current events")
        .func(|_| Ok::<_, HandlerError>("LangChain".to_string()))
        .build()?;

    ToolRegistry::new().add(adder)?.add(multiply)?.add(search)
}

/// Raw input goes in as text: text tools see it verbatim, structured tools
/// parse it as a JSON object before validating.
async fn run(registry: &ToolRegistry, tool: &str, input: &str) {
    match registry.execute(tool, input).await {
        Ok(output) => println!("{output}"),
        Err(e) => eprintln!("\x1b[1;31merror:\x1b[0m {e}"),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let registry = build_registry().unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    });

    if cli.list {
        let defs = Value::Array(registry.schemas());
        println!(
            "{}",
            serde_json::to_string_pretty(&defs).unwrap_or_else(|_| "[]".into())
        );
        return;
    }

    if let Some(ref tool) = cli.tool {
        run(&registry, tool, cli.input.as_deref().unwrap_or("")).await;
        return;
    }

    for tool in registry.iter() {
        let kind = if tool.schema().is_text() { "text" } else { "json" };
        eprintln!("  {} ({kind}): {}", tool.name(), tool.description());
    }
    eprintln!("---");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        eprint!("\x1b[1;36mtool>\x1b[0m ");
        io::stderr().flush().ok();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            _ => break,
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if matches!(trimmed, "exit" | "quit" | "/q") {
            break;
        }

        let (tool, input) = trimmed.split_once(char::is_whitespace).unwrap_or((trimmed, ""));
        run(&registry, tool, input.trim()).await;
    }

    eprintln!("bye.");
}
