#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::uninlined_format_args
)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use skygate::config::ServerTransport;
use skygate::Config;
use skygate::firehose::FirehoseConsumer;
use skygate::server::ToolServer;
use skygate::server::http::serve_http;
use skygate::tools::{ToolContext, all_tools, find_tool};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

/// Bluesky tool gateway with a Jetstream-fed local post cache.
#[derive(Parser, Debug)]
#[command(name = "skygate")]
#[command(version)]
#[command(about = "Bluesky tool gateway over JSON-RPC (stdio or HTTP).", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the tools over stdio, SSE or streamable HTTP
    Serve {
        /// Also run the firehose consumer, regardless of config
        #[arg(long)]
        firehose: bool,

        /// Transport (default from config: stdio)
        #[arg(long, value_enum)]
        transport: Option<ServerTransport>,

        /// Bind host for HTTP transports
        #[arg(long)]
        host: Option<String>,

        /// Bind port for HTTP transports
        #[arg(long)]
        port: Option<u16>,

        /// Path prefix for the HTTP endpoints, e.g. /bsky
        #[arg(long)]
        mount_path: Option<String>,
    },

    /// List available tools
    Tools,

    /// Run a single tool and print its output
    Call {
        /// Tool name, e.g. bsky_get_profile
        tool: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Search the local post cache
    Search {
        /// Case-sensitive substring; omit for the newest posts
        keyword: Option<String>,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Run the firehose consumer in the foreground
    Firehose,
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: Failed to install default crypto provider: {e:?}");
    }

    let cli = Cli::parse();

    // stdout belongs to the protocol; logs go to stderr. RUST_LOG overrides.
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut config = Config::load_or_init()?;
    let ctx = Arc::new(ToolContext::from_config(&config)?);

    match cli.command {
        Commands::Serve {
            firehose,
            transport,
            host,
            port,
            mount_path,
        } => {
            if let Some(transport) = transport {
                config.server.transport = transport;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(mount_path) = mount_path {
                config.server.mount_path = mount_path;
            }

            if firehose || config.firehose.enabled {
                let consumer = FirehoseConsumer::from_config(&config.firehose, ctx.store.clone());
                Arc::new(consumer).spawn();
            }
            let server = ToolServer::new(all_tools(&ctx));
            match config.server.transport {
                ServerTransport::Stdio => server.serve_stdio().await,
                transport => {
                    serve_http(
                        Arc::new(server),
                        transport,
                        &config.server.host,
                        config.server.port,
                        &config.server.mount_path,
                    )
                    .await
                }
            }
        }

        Commands::Tools => {
            for tool in all_tools(&ctx) {
                println!("{:<28} {}", tool.name(), tool.description());
            }
            Ok(())
        }

        Commands::Call { tool, args } => {
            let args: serde_json::Value =
                serde_json::from_str(&args).context("--args must be a JSON object")?;
            if !args.is_object() {
                bail!("--args must be a JSON object");
            }

            let tools = all_tools(&ctx);
            let Some(tool) = find_tool(&tools, &tool) else {
                bail!("Unknown tool: {tool}");
            };
            let result = tool.execute(args).await?;
            if !result.success {
                bail!(result.error.unwrap_or_else(|| "tool failed".into()));
            }
            println!("{}", result.output);
            Ok(())
        }

        Commands::Search { keyword, limit } => {
            let posts = ctx.store.search(keyword.as_deref(), limit).await?;
            println!("{}", serde_json::to_string_pretty(&posts)?);
            Ok(())
        }

        Commands::Firehose => {
            let consumer = Arc::new(FirehoseConsumer::from_config(&config.firehose, ctx.store.clone()));
            let handle = consumer.clone().spawn();
            tokio::signal::ctrl_c().await?;
            handle.abort();
            info!(stats = ?consumer.stats(), "Firehose consumer stopped");
            Ok(())
        }
    }
}
