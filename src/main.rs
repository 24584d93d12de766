use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use triangle_selector::graph::cost::cost_estimate;
use triangle_selector::options::TcCli;
use triangle_selector::printer::{print_graph, print_run, RunReport};
use triangle_selector::{triangle_count, Result, World};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = TcCli::parse();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("triangle count not as expected");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every run matched the closed form count, when there is one.
fn run(cli: &TcCli) -> Result<bool> {
    cli.describe();
    let num_workers = cli.workers;
    let configs = cli.configs(num_workers)?;
    let input = cli.graph(num_workers)?;
    let parts = input.graph.partition(num_workers)?;
    info!(
        vertices = input.graph.num_vertices(),
        edges = input.graph.num_edges(),
        "graph ready"
    );

    let correct = World::run(num_workers, |ctx| {
        let my_pe = ctx.rank();
        let rows = &parts[my_pe];
        let cost = cost_estimate(ctx, rows)?;
        print_graph(my_pe, input.graph.num_vertices(), input.graph.num_edges(), &cost);

        let mut correct = true;
        for iteration in 0..cli.iterations {
            for config in &configs {
                let run = triangle_count(ctx, rows, config.chunk_size)?;
                let report = RunReport::new(
                    iteration,
                    num_workers,
                    config.chunk_size,
                    &run,
                    input.expected,
                );
                print_run(my_pe, &report, cli.json);
                correct &= report.is_correct();
            }
        }
        Ok(correct)
    })?;
    Ok(correct.into_iter().all(|c| c))
}
