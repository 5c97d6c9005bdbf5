mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use mcp::{LaunchSpec, SessionRegistry, SessionState};
use runtime::{Conversation, McpToolHost, OpenAiBackend, ToolHost};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::Result;

const CONFIG_FILE: &str = "tern.toml";
const DEFAULT_LOG_FILTER: &str = "tern=info,mcp=info,runtime=info";

#[derive(Parser)]
#[command(name = "tern")]
#[command(about = "Chat with a model that can call tools from an MCP provider", long_about = None)]
#[command(version)]
struct Cli {
    /// Tool provider executable (.py, .js or .sh)
    provider: PathBuf,

    /// Configuration file [default: tern.toml if present]
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    println!("tern v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.as_deref())?;
    let gateway = config.gateway()?;
    let model = gateway.model.clone();

    let provider = Provider {
        spec: config.launch_spec(&cli.provider),
        connect_timeout: config.connect_timeout(),
        registry: SessionRegistry::new(),
    };
    let host = provider.connect().await?;

    println!("Provider: {}", cli.provider.display());
    println!("Model: {model}");
    print_tools(&host);
    println!("Type 'quit' or Ctrl+D to exit, '/tools' to list tools.\n");

    let mut conversation = Conversation::new(
        OpenAiBackend::new(gateway),
        host,
        config.conversation(),
    );
    if !config.gateway.system_prompt.is_empty() {
        conversation = conversation.with_system(config.gateway.system_prompt.clone());
    }

    let result = chat_loop(&mut conversation, &provider).await;
    conversation.close().await;
    println!("\nSession ended.");
    result
}

/// How to (re)start the tool provider.
struct Provider {
    spec: LaunchSpec,
    connect_timeout: Duration,
    registry: SessionRegistry,
}

impl Provider {
    async fn connect(&self) -> mcp::Result<McpToolHost> {
        let mut host = McpToolHost::connect(&self.spec, self.connect_timeout).await?;
        host.session_mut().register(&self.registry);
        info!(
            session = %host.session().id(),
            provider = %self.spec.executable.display(),
            "provider connected"
        );
        Ok(host)
    }
}

async fn chat_loop(
    conversation: &mut Conversation<OpenAiBackend, McpToolHost>,
    provider: &Provider,
) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }
        if input == "/tools" {
            print_tools(conversation.host());
            print_sessions(&provider.registry);
            continue;
        }

        match conversation.send(input).await {
            Ok(reply) => {
                if let Some(degraded) = reply.degraded {
                    warn!(?degraded, "degraded reply");
                }
                println!("\n{}\n", reply.text);
            }
            Err(e) => {
                warn!(error = %e, "turn failed");
                println!("\n{}\n", e.user_message());
            }
        }

        if conversation.host().session().state() == SessionState::Closed {
            eprintln!("The tool provider has stopped. Restarting it...");
            match provider.connect().await {
                Ok(host) => {
                    conversation.replace_host(host).await;
                    eprintln!("Tool provider restarted; the conversation continues.\n");
                }
                Err(e) => {
                    warn!(error = %e, "provider restart failed");
                    eprintln!("Could not restart the tool provider: {e}");
                    break;
                }
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None if Path::new(CONFIG_FILE).exists() => Ok(Config::load(CONFIG_FILE)?),
        None => Ok(Config::default()),
    }
}

fn print_tools(host: &McpToolHost) {
    let specs = host.specs();
    if specs.is_empty() {
        println!("No tools available.");
        return;
    }
    println!("Tools:");
    for spec in specs {
        if spec.description.is_empty() {
            println!("  {}", spec.name);
        } else {
            println!("  {:<20}  {}", spec.name, spec.description);
        }
    }
}

fn print_sessions(registry: &SessionRegistry) {
    for entry in registry.list() {
        let pid = entry
            .pid
            .map_or_else(|| "-".to_string(), |pid| pid.to_string());
        println!(
            "Session {}  pid {pid}  {}",
            entry.id,
            entry.executable.display()
        );
    }
}
