// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # upscale
//!
//! Command-line interface for the hybrid upscaling engine.
//!
//! ## Usage
//! ```bash
//! # Upscale a photo 8x with a 3 GB GPU budget on the software device
//! upscale run --input photo.png --output photo-8x.png --factor 8 --gpu-memory 3G
//!
//! # Print the stage plan for a 2000x3000 source at 15x
//! upscale plan --width 2000 --height 3000 --factor 15 --gpu-memory 3G
//!
//! # Show detected host resources and the effective configuration
//! upscale status
//! ```

mod commands;

use clap::{Parser, Subcommand};
use commands::DeviceKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "upscale",
    about = "Adaptive hybrid GPU/CPU image upscaler",
    version,
    author
)]
struct Cli {
    /// Path to a TOML engine configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Hardware options shared by `run` and `plan`.
#[derive(clap::Args, Clone)]
pub struct HardwareArgs {
    /// GPU memory (e.g., "512M", "3G"); omit for a CPU-only run.
    #[arg(short = 'g', long)]
    gpu_memory: Option<String>,

    /// Host memory budget; defaults to the memory the host reports available.
    #[arg(long)]
    host_memory: Option<String>,

    /// CPU worker threads; defaults to the available cores.
    #[arg(long)]
    cores: Option<usize>,

    /// GPU device backing the GPU lane.
    #[arg(long, value_enum, default_value = "software")]
    device: DeviceKind,
}

#[derive(Subcommand)]
enum Commands {
    /// Upscale an image file.
    Run {
        /// Source image (PNG, JPEG or TIFF).
        #[arg(short, long)]
        input: PathBuf,

        /// Destination image; the format follows the extension.
        #[arg(short, long)]
        output: PathBuf,

        /// Target scale factor.
        #[arg(short, long)]
        factor: f64,

        /// Return a preview when the result would exceed this size (e.g., "256M").
        #[arg(long)]
        display_max: Option<String>,

        #[command(flatten)]
        hardware: HardwareArgs,
    },

    /// Print the stage plan for a source size and factor without running it.
    Plan {
        #[arg(long)]
        width: u32,

        #[arg(long)]
        height: u32,

        /// Target scale factor.
        #[arg(short, long)]
        factor: f64,

        /// Channels per pixel (1-4).
        #[arg(long, default_value_t = 3)]
        channels: u8,

        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        hardware: HardwareArgs,
    },

    /// Display detected host resources and the effective configuration.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            input,
            output,
            factor,
            display_max,
            hardware,
        } => commands::run::execute(config, hardware, input, output, factor, display_max).await,
        Commands::Plan {
            width,
            height,
            factor,
            channels,
            json,
            hardware,
        } => commands::plan::execute(config, hardware, width, height, factor, channels, json),
        Commands::Status => commands::status::execute(config),
    }
}
