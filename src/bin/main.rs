use clap::{Parser, Subcommand};
use std::path::PathBuf;

use anyhow::Error;
use openapi_diff::{parse_openapi_with_sourcemap, update_by_example, UpdateOptions};
use tracing_subscriber::EnvFilter;

/// Compare, update and sourcemap OpenAPI documents
#[derive(Parser)]
#[clap(about, version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compare old and new document, and print differences
    Diff {
        /// The old document
        lhs: PathBuf,
        /// The new document
        rhs: PathBuf,
    },
    /// Patch schemas until they accept the examples next to them, and print the patches
    Update {
        /// The document to update
        spec: PathBuf,
        /// Only apply patches that cannot break consumers
        #[arg(long)]
        safe_only: bool,
        /// Print the updated document instead of the patches
        #[arg(long)]
        print_spec: bool,
    },
    /// Print where every part of a (multi-file) document was read from
    Sourcemap {
        /// The root file of the document
        spec: PathBuf,
    },
}

fn main() -> Result<(), Error> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("openapi_diff=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match args.command {
        Command::Diff { lhs, rhs } => {
            let lhs = parse_openapi_with_sourcemap(&lhs)?.json_like;
            let rhs = parse_openapi_with_sourcemap(&rhs)?.json_like;

            for change in openapi_diff::diff(&lhs, &rhs)? {
                println!("{}", serde_json::to_string(&change)?);
            }
        }
        Command::Update {
            spec,
            safe_only,
            print_spec,
        } => {
            let spec = parse_openapi_with_sourcemap(&spec)?.json_like;
            let options = UpdateOptions {
                safe_only,
                ..Default::default()
            };
            let result = update_by_example(&spec, &options)?;
            tracing::info!(stats = ?result.stats, "update finished");

            if print_spec {
                println!("{}", serde_json::to_string_pretty(&result.spec)?);
            } else {
                for patch in result.patches {
                    println!("{}", serde_json::to_string(&patch)?);
                }
            }
        }
        Command::Sourcemap { spec } => {
            let output = parse_openapi_with_sourcemap(&spec)?.sourcemap.serialize();
            println!("{}", serde_json::to_string(&output)?);
        }
    }
    Ok(())
}
