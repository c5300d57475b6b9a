//! lexrpc CLI - call XRPC methods from the command line.
//!
//! ```text
//! lexrpc call https://bsky.social com.atproto.identity.resolveHandle -p handle=snarfed.org
//! lexrpc list --lexicons ./lexicons
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lexrpc::{bundled_documents, decode_params, load_dir, Client, Options, Registry};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "lexrpc")]
#[command(about = "Call XRPC methods described by lexicons")]
#[command(version)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Call a query or procedure on an XRPC server
    Call {
        /// Server base URL, eg https://bsky.social
        address: String,

        /// Method NSID, eg com.atproto.server.describeServer
        nsid: String,

        /// Query parameter as name=value (repeatable)
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// JSON input body for procedures
        #[arg(long)]
        input: Option<String>,

        /// Directory of lexicon JSON files (defaults to the bundled set)
        #[arg(long)]
        lexicons: Option<PathBuf>,

        /// Skip schema validation
        #[arg(long)]
        no_validate: bool,

        /// Truncate strings longer than their maxGraphemes
        #[arg(long)]
        truncate: bool,

        /// Extra request header as name:value (repeatable)
        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },

    /// List the methods defined in the loaded lexicons
    List {
        /// Directory of lexicon JSON files (defaults to the bundled set)
        #[arg(long)]
        lexicons: Option<PathBuf>,
    },
}

fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got {s}"))
}

fn parse_header(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once(':')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .ok_or_else(|| format!("expected name:value, got {s}"))
}

fn load_registry(dir: Option<&Path>) -> Result<Registry> {
    let documents = match dir {
        Some(dir) => load_dir(dir)
            .with_context(|| format!("Failed to load lexicons from {}", dir.display()))?,
        None => bundled_documents()?,
    };
    Ok(Registry::load(documents)?)
}

/// One `type<TAB>nsid` line per method, sorted by id.
fn method_lines(registry: &Registry) -> Vec<String> {
    registry
        .methods()
        .map(|(nsid, def)| format!("{}\t{}", def.def_type, nsid))
        .collect()
}

async fn call(
    address: String,
    nsid: &str,
    params: &[(String, String)],
    input: Option<&str>,
    lexicons: Option<&Path>,
    options: Options,
    headers: Vec<(String, String)>,
) -> Result<Option<Value>> {
    let registry = Arc::new(load_registry(lexicons)?);

    let params = decode_params(registry.get_method(nsid)?, params.iter().cloned())?;
    let input = input
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("--input is not valid JSON")?;

    let mut builder = Client::builder(address).registry(registry).options(options);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    let client = builder.build()?;

    debug!("Calling {} on {}", nsid, client.address());
    Ok(client.call(nsid, Some(params), input).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let default_level = if args.debug { "debug" } else { "warn" };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match args.command {
        Command::Call {
            address,
            nsid,
            params,
            input,
            lexicons,
            no_validate,
            truncate,
            headers,
        } => {
            let options = Options {
                validate: !no_validate,
                truncate,
            };
            let output = call(
                address,
                &nsid,
                &params,
                input.as_deref(),
                lexicons.as_deref(),
                options,
                headers,
            )
            .await?;

            if let Some(output) = output {
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
        }

        Command::List { lexicons } => {
            let registry = load_registry(lexicons.as_deref())?;
            let lines = method_lines(&registry);
            if lines.is_empty() {
                bail!("No methods defined in the loaded lexicons");
            }
            info!("{} methods", lines.len());
            for line in lines {
                println!("{}", line);
            }
        }
    }

    Ok(())
}
