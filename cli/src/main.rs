use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use toolloop_core::{
    Config, ContextBuilder, ManifestToolSource, Memory, Orchestrator, ToolRegistry, TurnOutcome,
    builtin_tools, create_memory, create_provider, get_config_path, save_config,
};
use tracing_subscriber::EnvFilter;

mod error;
mod server;

#[derive(Parser)]
#[command(name = "toolloop")]
#[command(about = "toolloop - tool-calling assistant with a keyword memory", long_about = None)]
struct Cli {
    /// Path to the config file (defaults to ~/.toolloop/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Keep memories in process memory instead of the JSONL file
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one turn, or an interactive session when no message is given
    Chat {
        #[arg(short, long)]
        message: Option<String>,
    },
    /// List registered tools
    Tools,
    /// Invoke a tool directly with JSON parameters
    Invoke {
        name: String,
        #[arg(default_value = "{}")]
        parameters: String,
    },
    /// Print stored memories, optionally filtered by a query
    Memories {
        #[arg(short, long)]
        query: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("toolloop_cli=info,toolloop_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(get_config_path);
    let command = cli.command.unwrap_or(Commands::Chat { message: None });

    if let Commands::Init { force } = command {
        if config_path.exists() && !force {
            println!(
                "{} {} (use --force to overwrite)",
                style("Config already exists:").yellow(),
                config_path.display()
            );
        } else {
            save_config(&Config::default(), &config_path)?;
            println!("{} {}", style("Wrote").green(), config_path.display());
        }
        return Ok(());
    }

    let config = Config::load_or_default(&config_path)?;

    let memory = create_memory(&config, cli.ephemeral);
    let registry = build_registry(&config, memory.clone())?;

    match command {
        Commands::Init { .. } => {}
        Commands::Serve { bind } => {
            let orchestrator = build_orchestrator(&config, memory, registry)?;
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            let state = Arc::new(server::ServerState {
                orchestrator: Arc::new(orchestrator),
            });
            server::serve(&bind, state).await?;
        }
        Commands::Chat { message } => {
            let orchestrator = build_orchestrator(&config, memory, registry)?;
            match message {
                Some(msg) => {
                    let outcome = orchestrator.process(&msg).await?;
                    print_outcome(&outcome);
                }
                None => interactive(&orchestrator).await,
            }
        }
        Commands::Tools => {
            for spec in registry.list_descriptors() {
                println!("{}  {}", style(&spec.name).cyan().bold(), spec.description);
                for (name, schema) in spec.properties().into_iter().flatten() {
                    let required = spec.required_parameters.iter().any(|r| r == name);
                    println!(
                        "    {}{}: {}",
                        name,
                        if required { "*" } else { "" },
                        schema.get("type").and_then(|t| t.as_str()).unwrap_or("any")
                    );
                }
            }
        }
        Commands::Invoke { name, parameters } => {
            let parameters: serde_json::Value =
                serde_json::from_str(&parameters).context("parameters must be JSON")?;
            let result = registry.invoke(&name, parameters).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Memories { query } => {
            let records = match query.as_deref() {
                Some(q) => memory.search(q).await?,
                None => memory.all().await?,
            };
            if records.is_empty() {
                println!("{}", style("No memories.").dim());
            }
            for record in records {
                println!(
                    "{} {}: {}",
                    style(record.created_at.format("%Y-%m-%d %H:%M:%S")).dim(),
                    style(&record.key).green(),
                    record.value
                );
            }
        }
    }

    Ok(())
}

fn build_registry(config: &Config, memory: Arc<dyn Memory>) -> Result<Arc<ToolRegistry>> {
    let mut registry = ToolRegistry::new();
    if let Some(dir) = &config.tools_dir {
        registry = registry.with_source(Arc::new(ManifestToolSource::new(dir.clone())));
    }
    for tool in builtin_tools(memory) {
        registry.register(tool)?;
    }
    let report = registry.refresh();
    for skipped in &report.skipped {
        eprintln!("{} {}", style("skipped:").yellow(), skipped);
    }
    Ok(Arc::new(registry))
}

fn build_orchestrator(
    config: &Config,
    memory: Arc<dyn Memory>,
    registry: Arc<ToolRegistry>,
) -> Result<Orchestrator> {
    let provider = create_provider(config)?;
    let context_builder =
        ContextBuilder::new(memory).with_system_prompt(config.system_prompt.clone());
    Ok(Orchestrator::new(provider, context_builder, registry))
}

fn print_outcome(outcome: &TurnOutcome) {
    if let Some(invocation) = &outcome.tool_invocation {
        println!(
            "{} {} -> {}",
            style("tool").magenta(),
            style(&invocation.name).bold(),
            invocation.result
        );
    }
    for ignored in &outcome.ignored_tool_calls {
        println!("{} {}", style("ignored").yellow(), ignored.name);
    }
    println!("{}", outcome.final_text);
}

async fn interactive(orchestrator: &Orchestrator) {
    println!("{}", style("toolloop").bold());
    println!("Type your message (Ctrl+D to exit):\n");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let mut input = String::new();
        let read = stdin.lock().read_line(&mut input);
        match read {
            Ok(0) | Err(_) => {
                println!("\nGoodbye!");
                break;
            }
            Ok(_) => {
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                match orchestrator.process(input).await {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(e) => eprintln!("{} {}", style("error:").red().bold(), e),
                }
                println!();
            }
        }
    }
}
