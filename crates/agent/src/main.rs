//! `swagger-agent`: list, describe and call the tools compiled from a directory of `OpenAPI`
//! specs.
//!
//! Results go to stdout as JSON; logs go to stderr.

mod settings;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use settings::{GlobalArgs, LogFormat};
use swagger_agent_openapi_tools::ToolRegistry;

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every tool, grouped by project
    Tools,
    /// Print one tool's description and input schema
    Describe {
        /// Tool name as printed by `tools`
        tool: String,
    },
    /// Call a tool and print `{"httpStatusCode": ..., "body": ...}`
    Call {
        /// Tool name as printed by `tools`
        tool: String,
        /// JSON object with the arguments
        #[arg(default_value = "{}")]
        arguments: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDescription<'a> {
    name: &'a str,
    summary: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.global.log_level, cli.global.log_format)?;

    let config = cli.global.agent_config()?;
    tracing::info!(
        specs = %config.specs_directory.display(),
        lazy = config.lazy_loading,
        "Starting"
    );
    let registry = ToolRegistry::start(config)
        .await
        .context("compile tools")?;
    let tools = registry.tools().await?;

    match cli.command {
        Commands::Tools => {
            print_json(&tools.by_project())?;
        }
        Commands::Describe { tool } => {
            let tool = tools
                .get(&tool)
                .with_context(|| format!("unknown tool '{tool}'"))?;
            print_json(&ToolDescription {
                name: &tool.name,
                summary: &tool.summary,
                description: &tool.description,
                input_schema: &tool.input_schema,
            })?;
        }
        Commands::Call { tool, arguments } => {
            let tool = tools
                .get(&tool)
                .with_context(|| format!("unknown tool '{tool}'"))?;
            println!("{}", tool.call_json(&arguments).await);
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}

fn init_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{level}'"))?;

    let fmt = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry.with(fmt).try_init(),
        LogFormat::Json => registry.with(fmt.json()).try_init(),
    }
    .context("install tracing subscriber")
}
