// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ambry, a local developer-assistance daemon.
//!
//! Binary entry point: argument parsing, exit-code mapping, and dispatch
//! to the serve and status commands.

mod serve;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// ambry: persistent memory, retrieval, learning, and spec orchestration
/// for an AI coding assistant.
#[derive(Parser, Debug)]
#[command(name = "ambry", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the background daemon.
    Serve {
        /// Host to bind.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to bind.
        #[arg(long, default_value_t = 8787)]
        port: u16,
        /// Project root (defaults to the current directory).
        #[arg(long)]
        project_root: Option<PathBuf>,
        /// Data directory (defaults to ~/.ai-framework/data).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Print daemon data-directory and spec status.
    Status {
        #[arg(long)]
        project_root: Option<PathBuf>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            host,
            port,
            project_root,
            data_dir,
        } => serve::run_serve(host, port, project_root, data_dir).await,
        Commands::Status {
            project_root,
            data_dir,
        } => status::run_status(project_root, data_dir).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}
