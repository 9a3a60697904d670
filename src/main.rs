//! # pgsemantic CLI
//!
//! ```bash
//! pgsemantic --config ./config/pgsemantic.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pgsemantic search <table> <query>` | Run one similarity search and print it |
//! | `pgsemantic tables` | List vector-enabled tables |
//! | `pgsemantic serve` | Start the HTTP and MCP server |
//! | `pgsemantic completions <shell>` | Print shell completions |
//!
//! Logs go to stderr; set `RUST_LOG` to adjust (default `info`).

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use pgsemantic::config::{self, Config};
use pgsemantic::embedding::create_embedder;
use pgsemantic::registry::{ConnectionRegistry, DEFAULT_TENANT};
use pgsemantic::server;
use pgsemantic_core::embedding::Embedder;
use pgsemantic::traits::{ToolContext, ToolRegistry};

/// Semantic search over PostgreSQL tables with pgvector embeddings.
#[derive(Parser)]
#[command(name = "pgsemantic", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pgsemantic.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a similarity search and print the result.
    Search {
        /// Table name, `table` or `schema.table`.
        table: String,
        /// Natural language query.
        query: String,
        /// Rows fetched by the vector search.
        #[arg(long)]
        top_n: Option<usize>,
        /// Approximate tokens per chunk.
        #[arg(long)]
        chunk_size: Option<usize>,
        /// MMR balance between relevance (1.0) and diversity (0.0).
        #[arg(long)]
        lambda: Option<f64>,
        /// Token budget for returned chunks.
        #[arg(long)]
        max_tokens: Option<usize>,
        /// Distance metric: cosine, l2, or inner_product.
        #[arg(long)]
        metric: Option<String>,
        /// Output format: full, summary, or ids_only.
        #[arg(long)]
        format: Option<String>,
        /// Database key from `[databases]`.
        #[arg(long, default_value = DEFAULT_TENANT)]
        tenant: String,
    },

    /// List tables that have vector columns.
    Tables {
        #[arg(long, default_value = DEFAULT_TENANT)]
        tenant: String,
    },

    /// Start the HTTP server (REST tools plus MCP at `/mcp`).
    Serve,

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn tool_context(cfg: Config, tenant: &str) -> anyhow::Result<ToolContext> {
    let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&cfg.embedding)?);
    let registry = Arc::new(ConnectionRegistry::from_config(&cfg));
    Ok(ToolContext::new(Arc::new(cfg), registry, embedder, tenant))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "pgsemantic", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing();
    let cfg = config::load_config(&cli.config)?;
    let tools = Arc::new(ToolRegistry::with_builtins());

    match cli.command {
        Commands::Search {
            table,
            query,
            top_n,
            chunk_size,
            lambda,
            max_tokens,
            metric,
            format,
            tenant,
        } => {
            let mut params = json!({ "table_name": table, "query_text": query });
            let fields = [
                ("top_n", top_n.map(|v| json!(v))),
                ("chunk_size_tokens", chunk_size.map(|v| json!(v))),
                ("lambda", lambda.map(|v| json!(v))),
                ("max_output_tokens", max_tokens.map(|v| json!(v))),
                ("distance_metric", metric.map(|v| json!(v))),
                ("output_format", format.map(|v| json!(v))),
            ];
            for (key, value) in fields {
                if let Some(v) = value {
                    params[key] = v;
                }
            }

            let ctx = tool_context(cfg, &tenant)?;
            let output = tools.call("similarity_search", params, &ctx).await?;
            println!("{}", output.text);
            if output.is_error {
                std::process::exit(1);
            }
        }
        Commands::Tables { tenant } => {
            let ctx = tool_context(cfg, &tenant)?;
            let output = tools.call("list_vector_tables", json!({}), &ctx).await?;
            println!("{}", output.text);
        }
        Commands::Serve => {
            let ctx = tool_context(cfg, DEFAULT_TENANT)?;
            server::run_server(tools, ctx).await?;
        }
        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}
