//! modflow - demo runtime
//!
//! Builds a manager over the sample modules, runs a copier -> echo -> sink
//! pipeline, prints the management snapshot as JSON and, with `--serve`,
//! keeps serving the management endpoint until Ctrl+C.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam::channel::bounded;
use modflow_bins::common::{build_manager, init, print_stats, CommonArgs};
use modflow_core::flow::DataFlowId;
use modflow_core::module::{Data, DataRequest, ModuleUrn, ParamValue};
use modflow_core::monitoring::{ManagementServer, ManagementServerConfig};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Demo pipeline options
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Comma-separated items for the copier
    #[arg(long, default_value = "alpha,beta,gamma")]
    items: String,

    /// Echo prefix
    #[arg(long, default_value = "echo: ")]
    prefix: String,

    /// Also run a counter flow ticking every N ms (with --serve)
    #[arg(long)]
    counter_ms: Option<i64>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = init(&args.common)?;

    info!("=== modflow demo ===");
    info!(
        "Coupling: {}, fault policy: {}",
        config.runtime.coupling, config.runtime.fault_policy
    );

    let manager = build_manager(&config)?;
    manager.add_sink_listener(Arc::new(|flow_id: &DataFlowId, data: &Data| {
        match data.downcast_ref::<String>() {
            Some(text) => info!(flow = %flow_id, "sink <- {}", text),
            None => info!(flow = %flow_id, "sink <- <{}>", data.type_name()),
        }
    }));

    let echo = manager.create_module(
        &ModuleUrn::parse("echo")?,
        &[ParamValue::from(args.prefix.as_str())],
    )?;
    let copier = manager.create_module(&ModuleUrn::parse("copier")?, &[])?;

    let options = manager.default_flow_options().with_sink();
    let pipeline = manager.create_data_flow_with(
        &[
            DataRequest::with_parameter(copier, args.items.as_str()),
            DataRequest::new(echo),
        ],
        options,
    )?;
    info!("Pipeline {} started", pipeline);

    if !config.metrics.enable_server {
        manager.stop_data_flow(pipeline)?;
        let snapshot = manager.snapshot();
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        print_stats(&snapshot);
        manager.shutdown();
        return Ok(());
    }

    if let Some(interval) = args.counter_ms {
        let counter = manager.create_module(&ModuleUrn::parse("counter")?, &[interval.into()])?;
        manager.start_module(&counter)?;
        let ticks = manager.create_data_flow_with(&[DataRequest::new(counter)], options)?;
        info!("Counter flow {} started", ticks);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;
    let server = ManagementServer::new(
        ManagementServerConfig::from_addr(&config.metrics.listen_addr)?,
        Arc::clone(&manager),
    );
    runtime.spawn(async move {
        if let Err(e) = server.serve().await {
            error!("Management server stopped: {:#}", e);
        }
    });

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        warn!("Received Ctrl+C, initiating graceful shutdown...");
        let _ = shutdown_tx.try_send(());
    })?;

    info!("Serving on http://{} (Ctrl+C to stop)", config.metrics.listen_addr);
    let _ = shutdown_rx.recv();

    manager.shutdown();
    print_stats(&manager.snapshot());
    runtime.shutdown_background();
    Ok(())
}
