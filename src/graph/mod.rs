//! Lower-triangular adjacency structures.
//!
//! [`Graph`] is the whole graph as handed over by ingestion; it only exists
//! long enough to be cut into per-worker [`LocalRows`]. Rows are distributed
//! row-cyclically: vertex `v` lives on worker `v % num_workers` as local row
//! `v / num_workers`.

pub mod cost;
pub mod generators;

use crate::error::{Result, TcError};

/// Worker that owns global vertex `vertex`.
#[inline]
pub fn owner(vertex: u64, num_workers: usize) -> usize {
    (vertex % num_workers as u64) as usize
}

/// Row index of global vertex `vertex` on its owning worker.
#[inline]
pub fn local_index(vertex: u64, num_workers: usize) -> usize {
    (vertex / num_workers as u64) as usize
}

/// Number of rows worker `rank` owns out of `num_vertices`.
#[inline]
pub fn num_local_rows(num_vertices: usize, rank: usize, num_workers: usize) -> usize {
    if rank >= num_workers {
        return 0;
    }
    (num_vertices + num_workers - 1 - rank) / num_workers
}

/// CSR matrix holding only entries `(i, j)` with `j < i`, rows sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    num_vertices: usize,
    offsets: Vec<usize>,
    nonzeros: Vec<u64>,
}

impl Graph {
    /// Build from explicit rows. Every row must be sorted ascending and hold
    /// only columns smaller than its own row index; repeated columns are kept.
    pub fn from_rows(rows: Vec<Vec<u64>>) -> Result<Graph> {
        let num_vertices = rows.len();
        let mut offsets = Vec::with_capacity(num_vertices + 1);
        let mut nonzeros = Vec::with_capacity(rows.iter().map(|r| r.len()).sum());
        offsets.push(0);
        for (i, row) in rows.into_iter().enumerate() {
            if row.windows(2).any(|w| w[0] > w[1]) {
                return Err(TcError::MalformedGraph(format!(
                    "row {i} is not sorted ascending"
                )));
            }
            if let Some(&col) = row.iter().find(|&&col| col >= i as u64) {
                return Err(TcError::MalformedGraph(format!(
                    "row {i} holds column {col}, graph is not strictly lower triangular"
                )));
            }
            nonzeros.extend(row);
            offsets.push(nonzeros.len());
        }
        Ok(Graph {
            num_vertices,
            offsets,
            nonzeros,
        })
    }

    /// Build from an undirected edge list: edges are symmetrized, self loops and
    /// duplicates dropped, and only the strict lower triangle is kept.
    pub fn from_edges<I>(num_vertices: usize, edges: I) -> Result<Graph>
    where
        I: IntoIterator<Item = (u64, u64)>,
    {
        let mut rows = vec![Vec::new(); num_vertices];
        for (u, v) in edges {
            if u as usize >= num_vertices || v as usize >= num_vertices {
                return Err(TcError::MalformedGraph(format!(
                    "edge ({u}, {v}) references a vertex outside 0..{num_vertices}"
                )));
            }
            let (row, col) = if u > v { (u, v) } else { (v, u) };
            if row != col {
                rows[row as usize].push(col);
            }
        }
        for row in rows.iter_mut() {
            row.sort_unstable();
            row.dedup();
        }
        Graph::from_rows(rows)
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    pub fn num_edges(&self) -> usize {
        self.nonzeros.len()
    }

    pub fn row(&self, vertex: usize) -> &[u64] {
        &self.nonzeros[self.offsets[vertex]..self.offsets[vertex + 1]]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u64]> + '_ {
        (0..self.num_vertices).map(move |v| self.row(v))
    }

    /// The rows owned by `rank`, copied out into their own store.
    pub fn local_rows(&self, rank: usize, num_workers: usize) -> Result<LocalRows> {
        if num_workers == 0 || rank >= num_workers {
            return Err(TcError::InvalidConfig(format!(
                "rank {rank} does not exist among {num_workers} workers"
            )));
        }
        let mut offsets = vec![0];
        let mut nonzeros = vec![];
        for vertex in (rank..self.num_vertices).step_by(num_workers) {
            nonzeros.extend_from_slice(self.row(vertex));
            offsets.push(nonzeros.len());
        }
        LocalRows::new(rank, num_workers, self.num_vertices, offsets, nonzeros)
    }

    /// Cut the graph into one store per worker.
    pub fn partition(&self, num_workers: usize) -> Result<Vec<LocalRows>> {
        (0..num_workers)
            .map(|rank| self.local_rows(rank, num_workers))
            .collect()
    }

    /// Serial reference count: a triangle `k < j < i` is found once, from its
    /// largest vertex `i`, by checking `k` against `j`'s row with a binary search.
    pub fn brute_force_triangles(&self) -> u64 {
        let mut count = 0;
        for i in 0..self.num_vertices {
            let row = self.row(i);
            for (a, &j) in row.iter().enumerate() {
                let row_j = self.row(j as usize);
                count += row[..a]
                    .iter()
                    .filter(|&&k| k != j && row_j.binary_search(&k).is_ok())
                    .count() as u64;
            }
        }
        count
    }
}

/// The rows of the adjacency matrix owned by a single worker.
///
/// Immutable once built; a run only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRows {
    rank: usize,
    num_workers: usize,
    offsets: Vec<usize>,
    nonzeros: Vec<u64>,
}

impl LocalRows {
    pub fn new(
        rank: usize,
        num_workers: usize,
        num_vertices: usize,
        offsets: Vec<usize>,
        nonzeros: Vec<u64>,
    ) -> Result<LocalRows> {
        let expected_rows = num_local_rows(num_vertices, rank, num_workers);
        if offsets.len() != expected_rows + 1 {
            return Err(TcError::MalformedGraph(format!(
                "rank {rank} has {} row offsets, expected {}",
                offsets.len(),
                expected_rows + 1
            )));
        }
        if offsets[0] != 0
            || offsets.windows(2).any(|w| w[0] > w[1])
            || offsets[expected_rows] != nonzeros.len()
        {
            return Err(TcError::MalformedGraph(format!(
                "rank {rank} row offsets are not monotonic over {} nonzeros",
                nonzeros.len()
            )));
        }
        Ok(LocalRows {
            rank,
            num_workers,
            offsets,
            nonzeros,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn num_local_rows(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn nnz(&self) -> usize {
        self.nonzeros.len()
    }

    pub fn nonzeros(&self) -> &[u64] {
        &self.nonzeros
    }

    /// Neighbors of local row `local_row`, or `None` if this worker does not own it.
    pub fn row(&self, local_row: usize) -> Option<&[u64]> {
        if local_row >= self.num_local_rows() {
            return None;
        }
        Some(&self.nonzeros[self.offsets[local_row]..self.offsets[local_row + 1]])
    }

    /// `(local row, neighbors)` for every owned row, in ascending order.
    pub fn rows(&self) -> impl Iterator<Item = (usize, &[u64])> + '_ {
        self.offsets
            .windows(2)
            .enumerate()
            .map(move |(l_i, w)| (l_i, &self.nonzeros[w[0]..w[1]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// triangle {0,1,2} plus the pendant edge {2,3}
    fn small_graph() -> Graph {
        Graph::from_rows(vec![vec![], vec![0], vec![0, 1], vec![2]]).unwrap()
    }

    #[test]
    fn ownership_is_row_cyclic() {
        assert_eq!(owner(5, 2), 1);
        assert_eq!(local_index(5, 2), 2);
        assert_eq!(owner(6, 4), 2);
        assert_eq!(local_index(6, 4), 1);
        assert_eq!(num_local_rows(4, 0, 2), 2);
        assert_eq!(num_local_rows(4, 1, 2), 2);
        assert_eq!(num_local_rows(3, 1, 2), 1);
        assert_eq!(num_local_rows(2, 3, 4), 0);
        assert_eq!(num_local_rows(0, 0, 1), 0);
    }

    #[test]
    fn partition_splits_rows_by_owner() {
        let parts = small_graph().partition(2).unwrap();
        assert_eq!(parts.len(), 2);

        assert_eq!(parts[0].num_local_rows(), 2);
        assert_eq!(parts[0].row(0), Some(&[][..]));
        assert_eq!(parts[0].row(1), Some(&[0, 1][..]));

        assert_eq!(parts[1].row(0), Some(&[0][..]));
        assert_eq!(parts[1].row(1), Some(&[2][..]));
        assert_eq!(parts[1].row(2), None);
    }

    #[test]
    fn partition_keeps_every_edge() {
        let graph = small_graph();
        for num_workers in 1..6 {
            let parts = graph.partition(num_workers).unwrap();
            let total: usize = parts.iter().map(|p| p.nnz()).sum();
            assert_eq!(total, graph.num_edges());
            let rows: usize = parts.iter().map(|p| p.num_local_rows()).sum();
            assert_eq!(rows, graph.num_vertices());
        }
    }

    #[test]
    fn rejects_unsorted_and_upper_entries() {
        assert!(matches!(
            Graph::from_rows(vec![vec![], vec![0], vec![1, 0]]),
            Err(TcError::MalformedGraph(_))
        ));
        assert!(matches!(
            Graph::from_rows(vec![vec![], vec![1]]),
            Err(TcError::MalformedGraph(_))
        ));
    }

    #[test]
    fn rejects_inconsistent_offsets() {
        assert!(LocalRows::new(0, 1, 2, vec![0, 1], vec![0]).is_err());
        assert!(LocalRows::new(0, 1, 2, vec![0, 2, 1], vec![0, 0]).is_err());
        assert!(LocalRows::new(0, 1, 2, vec![0, 0, 1], vec![0]).is_ok());
    }

    #[test]
    fn edges_are_symmetrized_and_triangularized() {
        let graph =
            Graph::from_edges(4, vec![(0, 1), (1, 0), (2, 0), (1, 2), (2, 3), (3, 3)]).unwrap();
        assert_eq!(graph, small_graph());
        assert!(Graph::from_edges(2, vec![(0, 2)]).is_err());
    }

    #[test]
    fn brute_force_counts_small_graphs() {
        assert_eq!(small_graph().brute_force_triangles(), 1);
        let k4_edges = vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];
        let k4 = Graph::from_edges(4, k4_edges).unwrap();
        assert_eq!(k4.brute_force_triangles(), 4);
        assert_eq!(Graph::from_rows(vec![vec![]; 5]).unwrap().brute_force_triangles(), 0);
    }
}
