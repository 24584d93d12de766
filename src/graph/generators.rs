//! Synthetic input graphs.
//!
//! Kronecker products of star graphs have a closed form triangle count, which
//! makes them the correctness check for a run; Erdős–Rényi graphs are the
//! default random workload.

use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::Graph;
use crate::error::{Result, TcError};

/// Self loops added to each star before taking Kronecker products.
///
/// Mode 0 graphs are bipartite and triangle free, mode 1 puts a loop on the
/// star center, mode 2 puts one on the last leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KronMode {
    NoLoops,
    CenterLoop,
    LeafLoop,
}

impl TryFrom<u8> for KronMode {
    type Error = TcError;
    fn try_from(mode: u8) -> Result<Self> {
        match mode {
            0 => Ok(KronMode::NoLoops),
            1 => Ok(KronMode::CenterLoop),
            2 => Ok(KronMode::LeafLoop),
            _ => Err(TcError::InvalidConfig(format!(
                "unsupported kronecker mode {mode}"
            ))),
        }
    }
}

/// A Kronecker graph request: `mode` followed by the star sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KroneckerSpec {
    pub mode: KronMode,
    pub stars: Vec<usize>,
}

impl KroneckerSpec {
    pub fn new(mode: KronMode, stars: Vec<usize>) -> Result<KroneckerSpec> {
        if stars.len() < 2 {
            return Err(TcError::InvalidConfig(format!(
                "kronecker product needs at least two stars, got {:?}",
                stars
            )));
        }
        if stars.iter().any(|&m| m == 0) {
            return Err(TcError::InvalidConfig(
                "kronecker stars need at least one leaf".to_string(),
            ));
        }
        Ok(KroneckerSpec { mode, stars })
    }

    /// Closed form triangle count of the generated graph.
    pub fn expected_triangles(&self) -> u64 {
        let n = self.stars.len() as i32;
        let count = match self.mode {
            KronMode::NoLoops => 0.0,
            KronMode::CenterLoop => {
                let a: f64 = self.stars.iter().map(|&s| 3.0 * s as f64 + 1.0).product();
                let x: f64 = self.stars.iter().map(|&s| s as f64 + 1.0).product();
                a / 6.0 - 0.5 * x + 1.0 / 3.0
            }
            KronMode::LeafLoop => 4f64.powi(n) / 6.0 - 2f64.powi(n - 1) + 1.0 / 3.0,
        };
        count.round() as u64
    }

    pub fn num_vertices(&self) -> usize {
        self.stars.iter().map(|&s| s + 1).product()
    }
}

impl FromStr for KroneckerSpec {
    type Err = TcError;

    /// Parses `"<mode> <s1> <s2> ..."`, optionally wrapped in quotes.
    fn from_str(s: &str) -> Result<Self> {
        let mut fields = s.trim().trim_matches('"').split_whitespace();
        let mode = fields
            .next()
            .ok_or_else(|| TcError::InvalidConfig("empty kronecker string".to_string()))?;
        let mode = mode
            .parse::<u8>()
            .map_err(|_| TcError::InvalidConfig(format!("bad kronecker mode {mode:?}")))?;
        let stars = fields
            .map(|f| {
                f.parse::<usize>()
                    .map_err(|_| TcError::InvalidConfig(format!("bad kronecker star {f:?}")))
            })
            .collect::<Result<Vec<_>>>()?;
        KroneckerSpec::new(KronMode::try_from(mode)?, stars)
    }
}

/// Square pattern-only matrix used while building Kronecker products.
#[derive(Debug, Clone)]
struct LocalMat {
    offsets: Vec<usize>,
    nonzeros: Vec<usize>,
}

impl LocalMat {
    fn numrows(&self) -> usize {
        self.offsets.len() - 1
    }

    fn row(&self, row: usize) -> &[usize] {
        &self.nonzeros[self.offsets[row]..self.offsets[row + 1]]
    }

    /// Star `K_{1,m}` with vertex 0 as the center.
    fn star(m: usize, mode: KronMode) -> LocalMat {
        let mut offsets = vec![0];
        let mut nonzeros = vec![];
        if mode == KronMode::CenterLoop {
            nonzeros.push(0);
        }
        nonzeros.extend(1..=m);
        offsets.push(nonzeros.len());
        for leaf in 1..=m {
            nonzeros.push(0);
            if mode == KronMode::LeafLoop && leaf == m {
                nonzeros.push(m);
            }
            offsets.push(nonzeros.len());
        }
        LocalMat { offsets, nonzeros }
    }

    fn from_stars(stars: &[usize], mode: KronMode) -> LocalMat {
        stars
            .iter()
            .map(|&m| LocalMat::star(m, mode))
            .reduce(|acc, star| acc.kron_prod(&star))
            .unwrap_or(LocalMat {
                offsets: vec![0, 0],
                nonzeros: vec![],
            })
    }

    /// `(rb, rc)` is adjacent to `(cb, cc)` iff `rb ~ cb` in self and `rc ~ cc` in other.
    fn kron_prod(&self, other: &LocalMat) -> LocalMat {
        let n_other = other.numrows();
        let mut offsets = vec![0];
        let mut nonzeros = Vec::with_capacity(self.nonzeros.len() * other.nonzeros.len());
        for rb in 0..self.numrows() {
            for rc in 0..n_other {
                for &cb in self.row(rb) {
                    nonzeros.extend(other.row(rc).iter().map(|&cc| cb * n_other + cc));
                }
                offsets.push(nonzeros.len());
            }
        }
        LocalMat { offsets, nonzeros }
    }
}

/// Kronecker product `B ⊗ C` of two star products, B built from the first half
/// of the star list and C from the second, keeping the strict lower triangle.
pub fn kronecker_graph(spec: &KroneckerSpec) -> Result<Graph> {
    let half = spec.stars.len() / 2;
    let b = LocalMat::from_stars(&spec.stars[..half], spec.mode);
    let c = LocalMat::from_stars(&spec.stars[half..], spec.mode);
    tracing::debug!(
        b_rows = b.numrows(),
        b_nnz = b.nonzeros.len(),
        c_rows = c.numrows(),
        c_nnz = c.nonzeros.len(),
        "kronecker factors"
    );
    let a = b.kron_prod(&c);
    let rows = (0..a.numrows())
        .map(|row| {
            let mut lower = a
                .row(row)
                .iter()
                .filter(|&&col| col < row)
                .map(|&col| col as u64)
                .collect::<Vec<u64>>();
            lower.sort_unstable();
            lower
        })
        .collect();
    Graph::from_rows(rows)
}

/// Erdős–Rényi edge probability for a requested average row density.
pub fn erdos_renyi_prob(numrows: usize, nz_per_row: f64) -> f64 {
    if numrows == 0 {
        return 0.0;
    }
    (2.0 * (nz_per_row - 1.0) / numrows as f64).clamp(0.0, 1.0)
}

/// Undirected loop free G(n, p), stored lower triangular. Deterministic in `seed`.
pub fn erdos_renyi_graph(numrows: usize, prob: f64, seed: u64) -> Result<Graph> {
    if !(0.0..=1.0).contains(&prob) {
        return Err(TcError::InvalidConfig(format!(
            "erdos renyi probability {prob} is outside [0, 1]"
        )));
    }
    let mut rng: StdRng = SeedableRng::seed_from_u64(seed);
    let rows = (0..numrows)
        .map(|row| {
            (0..row as u64)
                .filter(|_| rng.gen_bool(prob))
                .collect::<Vec<u64>>()
        })
        .collect();
    Graph::from_rows(rows)
}
