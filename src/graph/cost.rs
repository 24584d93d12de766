//! Work estimates for a partitioned graph.
//!
//! Pulling row `j` for every edge `(i, j)` costs `colsum(j)` row transfers per
//! stored neighbor; pushing row `i` once per edge costs `C(deg(i), 2)`
//! intersection lookups. Column sums are spread over the workers, so they are
//! computed with a fetch-and-increment mailbox addressed to the column owner.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::Serialize;
use tracing::debug;

use super::{local_index, owner, LocalRows};
use crate::error::{Result, TcError};
use crate::runtime::mailbox::{Handler, Selector};
use crate::runtime::{finish, WorkerCtx};

/// Counts, for every owned row, how many stored entries reference it as a column.
pub struct ColumnCountHandler<'a> {
    rows: &'a LocalRows,
    counts: Vec<AtomicI64>,
}

impl<'a> ColumnCountHandler<'a> {
    pub fn new(rows: &'a LocalRows) -> ColumnCountHandler<'a> {
        ColumnCountHandler {
            rows,
            counts: (0..rows.num_local_rows()).map(|_| AtomicI64::new(0)).collect(),
        }
    }

    pub fn colsum(&self, local_row: usize) -> i64 {
        self.counts
            .get(local_row)
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }
}

impl Handler<usize> for ColumnCountHandler<'_> {
    fn process(&self, local_row: usize, _sender_rank: usize) -> Result<()> {
        let slot = self
            .counts
            .get(local_row)
            .ok_or_else(|| TcError::PartitionViolation {
                rank: self.rows.rank(),
                target_vertex: local_row,
                local_rows: self.rows.num_local_rows(),
            })?;
        slot.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CostEstimate {
    pub pulls: i64,
    pub pushes: i64,
}

/// Global pull and push estimates. Collective.
pub fn cost_estimate(ctx: &WorkerCtx<'_>, rows: &LocalRows) -> Result<CostEstimate> {
    let num_workers = ctx.num_workers();
    let selector = Selector::<usize, _>::new(ctx, ColumnCountHandler::new(rows))?;
    let local = finish(|scope| -> Result<u64> {
        let drain = selector.start(scope)?;
        let sent = rows.nonzeros().iter().try_for_each(|&col| {
            selector.send(local_index(col, num_workers), owner(col, num_workers))
        });
        let announced = selector.done();
        let processed = drain.wait();
        sent?;
        announced?;
        processed
    });
    ctx.barrier()?;
    let processed = ctx.agree(local)?;

    let counts = selector.handler();
    let mut pulls = 0;
    let mut pushes = 0;
    for (l_i, row) in rows.rows() {
        let deg = row.len() as i64;
        pulls += deg * counts.colsum(l_i);
        pushes += deg * (deg - 1) / 2;
    }
    debug!(
        rank = ctx.rank(),
        nnz = rows.nnz(),
        processed,
        pulls,
        pushes,
        "local cost"
    );

    Ok(CostEstimate {
        pulls: ctx.reduce_add_i64(pulls)?,
        pushes: ctx.reduce_add_i64(pushes)?,
    })
}
