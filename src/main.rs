use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use graph_analytics::algorithms::components::Components;
use graph_analytics::algorithms::ktruss::KTruss;
use graph_analytics::algorithms::verify::{serial_truss_numbers, truss_numbers_match};
use graph_analytics::config::EngineConfig;
use graph_analytics::error::{GraphError, Result};
use graph_analytics::graph::{Edge, EdgeList, EdgeSlot, Graph, TrussEdge};
use graph_analytics::measure::measure;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(ValueEnum, Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum Task {
    /// Connected components by label propagation.
    Components,
    /// K-truss decomposition.
    Ktruss,
}

#[derive(Parser, Debug, Serialize)]
#[command(author, version, about)]
struct Args {
    /// Edge list file, one `src dst` pair per line.
    #[arg(short, long)]
    graph: PathBuf,

    /// The task to be performed.
    #[arg(short, long, value_enum)]
    task: Task,

    /// Repeat count; at least one trial must run.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    num_trials: u64,

    /// Worker threads; overrides the config file.
    #[arg(short, long)]
    num_threads: Option<usize>,

    /// Degree at which a vertex's edges are split across workers; overrides the config file.
    #[arg(short, long)]
    edge_grain: Option<usize>,

    /// YAML engine configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the final trial against a serial computation.
    #[arg(long)]
    check_results: bool,

    /// Print per-vertex or per-edge results to stdout.
    #[arg(long)]
    dump_results: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("GRAPH_ANALYTICS_LOG")
        .unwrap_or_else(|_| EnvFilter::new("graph_analytics=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(io::stderr))
        .init();
}

fn stdout_error(source: io::Error) -> GraphError {
    GraphError::Io {
        path: "<stdout>".to_string(),
        source,
    }
}

fn log_graph<E: EdgeSlot>(graph: &Graph<E>) {
    let summary = graph.degree_summary();
    info!(
        num_vertices = graph.num_vertices(),
        num_edges = graph.num_edges(),
        max_degree = summary.max_degree,
        mean_degree = summary.mean_degree,
        num_hubs = summary.num_hubs,
        "graph loaded"
    );
}

fn run_components(args: &Args, config: &EngineConfig, edge_list: &EdgeList) -> Result<bool> {
    let graph: Graph<Edge> = Graph::from_edge_list(edge_list).with_edge_grain(config.edge_grain);
    log_graph(&graph);

    let components = Components::new(&graph, config.components.clone());
    for trial in 0..args.num_trials {
        components.clear();
        let execution_result = measure(|| components.run());
        execution_result.log_summary(&format!("components trial {trial}"));
    }

    let passed = !args.check_results || components.check();
    if args.check_results {
        info!(passed, "components check finished");
    }
    if args.dump_results {
        let mut out = io::stdout().lock();
        components.dump(&mut out).map_err(stdout_error)?;
        out.flush().map_err(stdout_error)?;
    }
    Ok(passed)
}

fn run_ktruss(args: &Args, config: &EngineConfig, edge_list: &EdgeList) -> Result<bool> {
    let mut graph: Graph<TrussEdge> =
        Graph::from_edge_list(edge_list).with_edge_grain(config.edge_grain);
    log_graph(&graph);
    let expected = args
        .check_results
        .then(|| measure(|| serial_truss_numbers(&graph)));
    if let Some(execution_result) = &expected {
        info!(
            elapsed_ms = execution_result.elapsed_ms(),
            "serial truss numbers computed"
        );
    }

    let mut ktruss = KTruss::new(&mut graph, config.ktruss.clone());
    for trial in 0..args.num_trials {
        ktruss.clear();
        let execution_result = measure(|| ktruss.run());
        execution_result.log_summary(&format!("ktruss trial {trial}"));
    }

    let passed = match &expected {
        Some(execution_result) => {
            let passed = truss_numbers_match(&execution_result.result, &ktruss.truss_numbers());
            info!(passed, "ktruss check finished");
            passed
        }
        None => true,
    };
    if args.dump_results {
        let mut out = io::stdout().lock();
        ktruss.dump(&mut out).map_err(stdout_error)?;
        out.flush().map_err(stdout_error)?;
    }
    Ok(passed)
}

fn run(args: Args) -> Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(num_threads) = args.num_threads {
        config.num_threads = num_threads;
    }
    if let Some(edge_grain) = args.edge_grain {
        config.edge_grain = edge_grain;
    }
    info!(?config, task = ?args.task, "starting");

    let pool = ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build()?;
    let edge_list = EdgeList::load(&args.graph)?;

    let passed = pool.install(|| match args.task {
        Task::Components => run_components(&args, &config, &edge_list),
        Task::Ktruss => run_ktruss(&args, &config, &edge_list),
    })?;

    if passed {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("result check failed");
        Ok(ExitCode::FAILURE)
    }
}

fn main() -> ExitCode {
    init_tracing();
    match run(Args::parse()) {
        Ok(code) => code,
        Err(err) => {
            error!(%err, "graph-analytics failed");
            ExitCode::FAILURE
        }
    }
}
