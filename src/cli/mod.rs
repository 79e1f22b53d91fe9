//! kolosal-compose CLI module
//!
//! Inspect registered operators, validate hyperparameters and compile search
//! spaces for pipeline expressions.

use clap::{Parser, Subcommand};
use colored::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Instant;

use crate::operator::OperatorRegistry;
use crate::pipeline::parse;
use crate::search_space::{compile, Distribution};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn pretty(value: &impl serde::Serialize) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn describe(dist: &Distribution) -> String {
    match dist {
        Distribution::Uniform { low, high } => format!("uniform [{}, {}]", low, high),
        Distribution::LogUniform { low, high } => format!("loguniform [{}, {}]", low, high),
        Distribution::IntUniform { low, high } => format!("int [{}, {}]", low, high),
        Distribution::IntLogUniform { low, high } => format!("int loguniform [{}, {}]", low, high),
        Distribution::Categorical { choices } => format!("one of {}", Value::Array(choices.clone())),
        Distribution::Constant { value } => format!("= {}", value),
        Distribution::OneOf { alternatives } => {
            let parts: Vec<String> = alternatives.iter().map(describe).collect();
            parts.join(" | ")
        }
    }
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "kolosal-compose")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compose operators into pipelines and compile their search spaces")]
#[command(long_about = None)]
pub struct Cli {
    /// Additional operator declarations (JSON array)
    #[arg(long, global = true)]
    pub operators: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List registered operators
    List,

    /// Print the hyperparameter schema of an operator or pipeline
    Schema {
        /// Operator name or pipeline expression
        expr: String,
    },

    /// Print the default configuration of an operator or pipeline
    Defaults {
        /// Operator name or pipeline expression
        expr: String,
    },

    /// Validate a configuration against an operator or pipeline
    Validate {
        /// Operator name or pipeline expression
        expr: String,

        /// Configuration as JSON
        #[arg(short, long)]
        params: String,
    },

    /// Compile the search space of a pipeline expression
    Compile {
        /// Pipeline expression, e.g. "PCA >> (LogisticRegression | KNeighborsClassifier)"
        expr: String,

        /// Write the search space as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Draw random configurations from a pipeline's search space
    Sample {
        /// Pipeline expression
        expr: String,

        /// Number of configurations
        #[arg(short, default_value = "5")]
        n: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Print the operator graph of a pipeline expression
    Graph {
        /// Pipeline expression
        expr: String,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_list(registry: &OperatorRegistry) -> anyhow::Result<()> {
    section("Operators");
    println!("  {:<26} {}", muted("Name"), muted("Tags"));
    for op in registry.iter() {
        let tags = op.tags();
        let mut all: Vec<&str> = tags.op.iter().map(String::as_str).collect();
        all.extend(tags.post.iter().map(String::as_str));
        let implemented = if op.estimator().is_some() { ok("●") } else { dim("○") };
        println!("  {} {:<24} {}", implemented, op.name(), dim(&all.join(", ")));
    }
    println!();
    println!("  {} {}", dim(&format!("{} operators", registry.len())), dim("(● has an implementation)"));
    println!();
    Ok(())
}

pub fn cmd_schema(registry: &OperatorRegistry, expr: &str) -> anyhow::Result<()> {
    let op = parse(expr, registry)?;
    println!("{}", pretty(&op.hyperparam_schema())?);
    Ok(())
}

pub fn cmd_defaults(registry: &OperatorRegistry, expr: &str) -> anyhow::Result<()> {
    let op = parse(expr, registry)?;
    println!("{}", pretty(&op.defaults())?);
    Ok(())
}

pub fn cmd_validate(registry: &OperatorRegistry, expr: &str, params: &str) -> anyhow::Result<()> {
    let op = parse(expr, registry)?;
    let config: Value = serde_json::from_str(params)?;

    match op.bind(&config) {
        Ok(bound) => {
            step_ok(&format!("valid configuration for {}", op));
            println!("{}", pretty(&bound.to_json())?);
            Ok(())
        }
        Err(err) => {
            let found = op.violations(&config);
            section("Violations");
            if found.is_empty() {
                println!("  {} {}", "✗".red(), err);
            }
            for v in &found {
                println!("  {} {}", "✗".red(), v);
            }
            println!();
            Err(err.into())
        }
    }
}

pub fn cmd_compile(registry: &OperatorRegistry, expr: &str, output: Option<&PathBuf>) -> anyhow::Result<()> {
    let op = parse(expr, registry)?;
    let start = Instant::now();
    let space = compile(&op)?;
    let elapsed = start.elapsed();

    section(&format!("Search space of {}", op));
    for (i, arm) in space.arms().iter().enumerate() {
        println!("  {} {}", accent(&format!("arm {}", i)), arm.label.white().bold());
        for (path, dist) in &arm.params {
            println!("    {:<44} {}", muted(path), describe(dist));
        }
    }
    println!();
    println!(
        "  {}",
        dim(&format!("{} arms, {} hyperparameters, compiled in {:.2?}", space.n_arms(), space.n_params(), elapsed))
    );

    if let Some(path) = output {
        std::fs::write(path, pretty(&space)?)?;
        step_ok(&format!("wrote {}", path.display()));
    }
    println!();
    Ok(())
}

pub fn cmd_sample(registry: &OperatorRegistry, expr: &str, n: usize, seed: u64) -> anyhow::Result<()> {
    let op = parse(expr, registry)?;
    let space = compile(&op)?;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

    for i in 0..n {
        let sample = space.sample(&mut rng)?;
        let status = match op.bind(&sample.config) {
            Ok(_) => ok("valid"),
            Err(_) => "invalid".red(),
        };
        println!("  {} {} {}", accent(&format!("#{}", i)), sample.label.white(), status);
        println!("{}", serde_json::to_string(&sample.config)?);
    }
    Ok(())
}

pub fn cmd_graph(registry: &OperatorRegistry, expr: &str) -> anyhow::Result<()> {
    let op = parse(expr, registry)?;
    let graph = op.graph();
    let order = graph.topological_order()?;

    section(&format!("Graph of {}", op));
    for id in &order {
        if let Some(node) = graph.node(*id) {
            let branch = node.choice.map(|c| format!("  (branch of choice {})", c)).unwrap_or_default();
            println!("  {:<6} {}{}", dim(&id.to_string()), node.name.white(), dim(&branch));
        }
    }
    for (from, to) in &graph.edges {
        println!("  {} {} {}", dim(&from.to_string()), accent("→"), dim(&to.to_string()));
    }
    println!();
    Ok(())
}

pub fn run(cli: &Cli, registry: &OperatorRegistry) -> anyhow::Result<()> {
    match &cli.command {
        Commands::List => cmd_list(registry),
        Commands::Schema { expr } => cmd_schema(registry, expr),
        Commands::Defaults { expr } => cmd_defaults(registry, expr),
        Commands::Validate { expr, params } => cmd_validate(registry, expr, params),
        Commands::Compile { expr, output } => cmd_compile(registry, expr, output.as_ref()),
        Commands::Sample { expr, n, seed } => cmd_sample(registry, expr, *n, *seed),
        Commands::Graph { expr } => cmd_graph(registry, expr),
    }
}
