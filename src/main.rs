//! fnflasher - FujiNet firmware flasher
//!
//! Browses the firmware catalog, downloads and validates firmware packages,
//! and flashes them onto ESP8266/ESP32 devices.
//!
//! # Architecture
//!
//! - `fnflasher-core` holds the pipeline: fetch, catalog, selection, package
//!   validation and the flash sequence
//! - `fnflasher-serial` finds ports and reads device logs
//! - programmer backends (feature-gated, see `programmers`) implement the
//!   chip protocol behind the `ChipProgrammer` trait

mod cli;
mod commands;
mod programmers;

use clap::Parser;
use cli::{Cli, Commands};
use commands::CmdResult;
use fnflasher_core::cache::ArtifactCache;
use fnflasher_core::fetch::ArtifactFetcher;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        tokio::select! {
            result = run(cli) => result,
            _ = tokio::signal::ctrl_c() => Err("Interrupted".into()),
        }
    });
    // A blocking log reader may still be running
    runtime.shutdown_background();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CmdResult {
    let fetcher = ArtifactFetcher::new(Arc::new(ArtifactCache::new()));

    match cli.command {
        Commands::Flash {
            device,
            sha256,
            raw,
            source,
        } => commands::flash::cmd_flash(&fetcher, &device, &source, sha256.as_deref(), raw).await,
        Commands::Install {
            device,
            platform,
            release,
        } => {
            commands::catalog::cmd_install(fetcher, &cli.catalog_url, &device, &platform, &release)
                .await
        }
        Commands::Platforms => commands::catalog::cmd_platforms(fetcher, &cli.catalog_url).await,
        Commands::Releases { platform } => {
            commands::catalog::cmd_releases(fetcher, &cli.catalog_url, &platform).await
        }
        Commands::Logs { port } => commands::logs::cmd_logs(port.as_deref()).await,
        Commands::ListPorts => commands::list_ports(),
        Commands::ListProgrammers => {
            commands::list_programmers();
            Ok(())
        }
    }
}
