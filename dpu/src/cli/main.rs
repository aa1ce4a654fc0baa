// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure DPU daemon, serves framebuffer allocations to the secure environment

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::{error, info, LevelFilter};

use secure_ui_dpu::{page_size, DmaHeapAllocator, SecureBufferService, TipcTransport};

/// Secure DPU buffer service
#[derive(Clone, PartialEq, Debug, Parser)]
struct Options {
    /// Trusty IPC device
    #[clap(long, default_value = "/dev/trusty-ipc-dev0")]
    device: PathBuf,

    /// Secure DPU service port
    #[clap(long, default_value = "com.android.trusty.secure_dpu")]
    port: String,

    /// dma-buf heap for secure framebuffers
    #[clap(long, default_value = "/dev/dma_heap/secure")]
    heap: PathBuf,

    /// Override the system page size used for buffer alignment
    #[clap(long, value_parser = clap::value_parser!(u64).range(1..))]
    page_size: Option<u64>,

    /// Enable verbose logging
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Options::parse();

    // Setup logging
    simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default())?;

    // Connect to secure DPU server
    let transport = TipcTransport::connect(&args.device, &args.port)
        .with_context(|| format!("failed to connect to {}", args.port))?;

    let allocator = DmaHeapAllocator::open(&args.heap)
        .with_context(|| format!("failed to open heap {}", args.heap.display()))?;

    let page_size = args.page_size.unwrap_or_else(page_size);

    let mut service = SecureBufferService::new(transport, allocator, page_size)?;

    info!("serving secure DPU requests on {}", args.port);

    // Loop exits only on fatal error, the supervisor restarts the daemon
    let e = match service.run() {
        Ok(never) => match never {},
        Err(e) => e,
    };

    error!("exiting secure DPU loop: {e}");

    Err(e.into())
}
