use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use triangle_selector::active_message::lamellar_am::triangle_count;
use triangle_selector::options::TcCli;
use triangle_selector::Result;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let world = lamellar::LamellarWorldBuilder::new().build();
    let cli = TcCli::parse();

    match run(&world, &cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("triangle count not as expected");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(rank = world.my_pe(), "{e}");
            ExitCode::FAILURE
        }
    }
}

/// The number of PEs comes from the launcher; `--workers` is ignored.
fn run(world: &lamellar::LamellarWorld, cli: &TcCli) -> Result<bool> {
    let my_pe = world.my_pe();
    let num_pes = world.num_pes();
    if my_pe == 0 {
        cli.describe();
    }
    let configs = cli.configs(num_pes)?;
    // every PE builds the same graph and keeps its own rows
    let input = cli.graph(num_pes)?;
    let rows = input.graph.local_rows(my_pe, num_pes)?;

    let mut correct = true;
    for iteration in 0..cli.iterations {
        for config in &configs {
            let run = triangle_count(world, rows.clone(), config.chunk_size)?;
            if my_pe == 0 {
                println!(
                    "iteration: {iteration} pes: {num_pes} chunk_size: {} triangles: {} \
                     expected: {:?} global time: {:?}",
                    config.chunk_size, run.triangles, input.expected, run.laptime
                );
                correct &= input.expected.map_or(true, |e| e as i64 == run.triangles);
            }
        }
    }
    Ok(correct)
}
