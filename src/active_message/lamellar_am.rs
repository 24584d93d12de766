//! The same push protocol as [`selector`](super::selector), with each packet
//! carried by a lamellar active message instead of an in-process mailbox.

use lamellar::active_messaging::prelude::*;
use lamellar::darc::prelude::*;

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Instant;

use tracing::debug;

use super::selector::chunks;
use crate::error::{Result, TcError};
use crate::graph::{local_index, owner, LocalRows};
use crate::intersection::sorted_intersection_count;

/// Per PE run state.
#[derive(Default)]
struct RunCounts {
    /// triangles closed by packets this PE handled
    local: AtomicI64,
    /// the global count, only filled on PE 0
    total: AtomicI64,
    /// one past the highest row this PE was asked for but does not own, 0 if none
    bad_row: AtomicUsize,
    /// PEs that reported a failure, the same on every PE after the last barrier
    failed: AtomicUsize,
}

/// Intersect `payload` with local row `target_vertex` of the receiving PE.
#[lamellar::AmData]
struct TriangleAm {
    rows: Darc<LocalRows>,
    cnt: Darc<RunCounts>,
    target_vertex: usize,
    payload: Vec<u64>,
}

#[lamellar::am]
impl LamellarAM for TriangleAm {
    async fn exec(self) {
        match self.rows.row(self.target_vertex) {
            Some(row) => {
                let cnt = sorted_intersection_count(&self.payload, row);
                self.cnt.local.fetch_add(cnt as i64, Ordering::Relaxed);
            }
            None => {
                self.cnt
                    .bad_row
                    .fetch_max(self.target_vertex + 1, Ordering::Relaxed);
            }
        }
    }
}

/// Add a PE's partial count to the total on PE 0.
#[lamellar::AmData]
struct CntAm {
    cnt: Darc<RunCounts>,
    triangles: i64,
}

#[lamellar::am]
impl LamellarAM for CntAm {
    async fn exec(self) {
        self.cnt.total.fetch_add(self.triangles, Ordering::Relaxed);
    }
}

/// Tell a PE that the sender failed.
#[lamellar::AmData]
struct FailedAm {
    cnt: Darc<RunCounts>,
}

#[lamellar::am]
impl LamellarAM for FailedAm {
    async fn exec(self) {
        self.cnt.failed.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LamellarRun {
    /// only meaningful on PE 0
    pub triangles: i64,
    pub local_count: i64,
    pub packets_sent: u64,
    pub laptime: f64,
}

/// What a PE returns once every PE knows how many PEs failed. A PE that failed
/// reports its own root cause, every other PE leaves with `Aborted`.
fn outcome(my_pe: usize, bad_row: usize, local_rows: usize, failed: usize) -> Result<()> {
    if bad_row > 0 {
        return Err(TcError::PartitionViolation {
            rank: my_pe,
            target_vertex: bad_row - 1,
            local_rows,
        });
    }
    if failed > 0 {
        return Err(TcError::Aborted { rank: my_pe });
    }
    Ok(())
}

/// Count triangles over the PEs of `world`. `rows` must be this PE's share of
/// a row-cyclic partition over `world.num_pes()` workers. Collective.
pub fn triangle_count(
    world: &LamellarWorld,
    rows: LocalRows,
    chunk_size: usize,
) -> Result<LamellarRun> {
    let my_pe = world.my_pe();
    let num_pes = world.num_pes();
    if chunk_size == 0 {
        return Err(TcError::InvalidConfig("chunk size must be positive".to_string()));
    }
    if rows.rank() != my_pe || rows.num_workers() != num_pes {
        return Err(TcError::InvalidConfig(format!(
            "rows of rank {}/{} handed to PE {my_pe}/{num_pes}",
            rows.rank(),
            rows.num_workers()
        )));
    }

    let rows = Darc::new(world, rows).map_err(|e| TcError::Runtime(format!("{e:?}")))?;
    let cnt = Darc::new(world, RunCounts::default())
        .map_err(|e| TcError::Runtime(format!("{e:?}")))?;

    world.barrier();
    let timer = Instant::now();
    let mut sent = 0;
    for (_l_i, row) in rows.rows() {
        for &l_j in row {
            for chunk in chunks(row, chunk_size) {
                let _ = world.exec_am_pe(
                    owner(l_j, num_pes),
                    TriangleAm {
                        rows: rows.clone(),
                        cnt: cnt.clone(),
                        target_vertex: local_index(l_j, num_pes),
                        payload: chunk.to_vec(),
                    },
                );
                sent += 1;
            }
        }
    }
    world.wait_all(); //every packet this PE sent has been handled
    world.barrier(); //every packet on every PE has been handled
    let laptime = timer.elapsed().as_secs_f64();

    // no TriangleAm is in flight past the barrier, so both are final
    let local_count = cnt.local.load(Ordering::SeqCst);
    let bad_row = cnt.bad_row.load(Ordering::SeqCst);
    debug!(rank = my_pe, sent, local_count, bad_row, "local run complete");

    if my_pe == 0 {
        cnt.total.fetch_add(local_count, Ordering::SeqCst);
    } else {
        world.block_on(world.exec_am_pe(
            0,
            CntAm {
                cnt: cnt.clone(),
                triangles: local_count,
            },
        ));
    }
    if bad_row > 0 {
        world.block_on(world.exec_am_all(FailedAm { cnt: cnt.clone() }));
    }
    world.barrier(); //the global count is on PE 0 and every failure is known

    outcome(
        my_pe,
        bad_row,
        rows.num_local_rows(),
        cnt.failed.load(Ordering::SeqCst),
    )?;
    Ok(LamellarRun {
        triangles: cnt.total.load(Ordering::SeqCst),
        local_count,
        packets_sent: sent,
        laptime,
    })
}
