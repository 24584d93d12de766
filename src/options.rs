use clap::Parser;
use tracing::info;

use crate::active_message::selector::{TcConfig, DEFAULT_CHUNK_SIZE};
use crate::error::Result;
use crate::graph::generators::{
    erdos_renyi_graph, erdos_renyi_prob, kronecker_graph, KroneckerSpec,
};
use crate::graph::Graph;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct TcCli {
    /// Number of workers the rows are spread over
    #[arg(short, long, default_value_t = 4)]
    pub workers: usize,

    /// Packet payload sizes to run with, one run per value
    #[arg(short, long, num_args(1..), default_values_t = vec![DEFAULT_CHUNK_SIZE])]
    pub chunk_size: Vec<usize>,

    #[arg(short, long, default_value_t = 1)]
    pub iterations: usize,

    /// Kronecker product of stars, "<mode> <s1> <s2> ...", mode 0, 1 or 2
    #[arg(short = 'K', long)]
    pub kron: Option<KroneckerSpec>,

    /// Erdős–Rényi rows per worker
    #[arg(short, long, default_value_t = 1000)]
    pub numrows_per_worker: usize,

    /// Erdős–Rényi average nonzeros per row, used when no probability is given
    #[arg(short = 'z', long, default_value_t = 35.0)]
    pub nz_per_row: f64,

    /// Erdős–Rényi edge probability, 0 derives it from nz-per-row
    #[arg(short, long, default_value_t = 0.0)]
    pub erdos_renyi_prob: f64,

    #[arg(long, default_value_t = 12345)]
    pub seed: u64,

    /// Also print each run as one json line
    #[arg(long)]
    pub json: bool,
}

/// The graph a run counts, with its closed form count if one is known.
pub struct GraphInput {
    pub graph: Graph,
    pub expected: Option<u64>,
}

impl TcCli {
    pub fn describe(&self) {
        info!("workers: {}", self.workers);
        info!("chunk size: {:?}", self.chunk_size);
        info!("iterations: {}", self.iterations);
        match &self.kron {
            Some(kron) => info!(
                "kronecker: mode {:?} stars {:?} vertices {}",
                kron.mode,
                kron.stars,
                kron.num_vertices()
            ),
            None => {
                info!("erdos renyi rows per worker: {}", self.numrows_per_worker);
                info!("erdos renyi prob: {}", self.prob(self.workers));
                info!("seed: {}", self.seed);
            }
        }
    }

    /// One validated config per requested chunk size.
    pub fn configs(&self, num_workers: usize) -> Result<Vec<TcConfig>> {
        self.chunk_size
            .iter()
            .map(|&chunk_size| TcConfig::new(num_workers, chunk_size))
            .collect()
    }

    fn prob(&self, num_workers: usize) -> f64 {
        if self.erdos_renyi_prob > 0.0 {
            self.erdos_renyi_prob
        } else {
            erdos_renyi_prob(self.numrows_per_worker * num_workers, self.nz_per_row)
        }
    }

    /// Build the requested graph. Every worker of a distributed run builds the
    /// same graph from the same arguments.
    pub fn graph(&self, num_workers: usize) -> Result<GraphInput> {
        match &self.kron {
            Some(kron) => Ok(GraphInput {
                graph: kronecker_graph(kron)?,
                expected: Some(kron.expected_triangles()),
            }),
            None => Ok(GraphInput {
                graph: erdos_renyi_graph(
                    self.numrows_per_worker * num_workers,
                    self.prob(num_workers),
                    self.seed,
                )?,
                expected: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::generators::KronMode;

    #[test]
    fn defaults() {
        let cli = TcCli::parse_from(["triangle_count"]);
        assert_eq!(cli.workers, 4);
        assert_eq!(cli.chunk_size, vec![DEFAULT_CHUNK_SIZE]);
        assert_eq!(cli.iterations, 1);
        assert!(cli.kron.is_none());
        assert_eq!(cli.numrows_per_worker, 1000);
        assert!(!cli.json);
    }

    #[test]
    fn parses_kron_and_chunk_sweep() {
        let cli = TcCli::parse_from([
            "triangle_count",
            "-w",
            "2",
            "-K",
            "1 2 3",
            "-c",
            "1",
            "8",
            "64",
        ]);
        assert_eq!(cli.chunk_size, vec![1, 8, 64]);
        let kron = cli.kron.clone().unwrap();
        assert_eq!(kron.mode, KronMode::CenterLoop);
        assert_eq!(kron.stars, vec![2, 3]);
        assert_eq!(cli.configs(2).unwrap().len(), 3);
        let input = cli.graph(2).unwrap();
        assert_eq!(input.expected, Some(kron.expected_triangles()));
        assert_eq!(input.graph.num_vertices(), 12);
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(TcCli::try_parse_from(["triangle_count", "-K", "5 2 2"]).is_err());
        let cli = TcCli::parse_from(["triangle_count", "-c", "0"]);
        assert!(cli.configs(4).is_err());
    }

    #[test]
    fn erdos_renyi_size_follows_workers() {
        let cli = TcCli::parse_from(["triangle_count", "-n", "10", "-e", "0.5"]);
        let input = cli.graph(3).unwrap();
        assert_eq!(input.graph.num_vertices(), 30);
        assert_eq!(input.expected, None);
    }
}
