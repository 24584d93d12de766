//! Triangle counting with a selector (mailbox bound actor).
//!
//! For every local edge `(i, j)` the worker owning row `i` pushes row `i`, cut
//! into chunks, to the worker owning `j`. That worker intersects each chunk
//! with its own row `j` and adds the result to its accumulator. A triangle
//! `k < j < i` is therefore counted exactly once, on the owner of `j`, when
//! `k` shows up in both row `i` and row `j`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Result, TcError};
use crate::graph::{local_index, owner, Graph, LocalRows};
use crate::intersection::sorted_intersection_count;
use crate::runtime::collectives::MinAvgMax;
use crate::runtime::mailbox::{Drain, Handler, Selector};
use crate::runtime::{finish, FinishScope, WorkerCtx, World};

pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// Settings of a single triangle counting run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TcConfig {
    pub num_workers: usize,
    pub chunk_size: usize,
}

impl Default for TcConfig {
    fn default() -> Self {
        TcConfig {
            num_workers: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TcConfig {
    pub fn new(num_workers: usize, chunk_size: usize) -> Result<TcConfig> {
        let config = TcConfig {
            num_workers,
            chunk_size,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(TcError::InvalidConfig("need at least one worker".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(TcError::InvalidConfig("chunk size must be positive".to_string()));
        }
        Ok(())
    }
}

/// A slice of the sender's row, addressed to a row of the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// local row on the receiving worker
    pub target_vertex: usize,
    pub payload: Vec<u64>,
}

impl Packet {
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

/// Cut `row` into consecutive chunks of `chunk_size`, the last one holding
/// the remainder. An empty row yields no chunks.
pub fn chunks(row: &[u64], chunk_size: usize) -> impl Iterator<Item = &[u64]> {
    row.chunks(chunk_size.max(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorState {
    Idle,
    Dispatching,
    LocalDrained,
    BarrierWait,
    Finished,
}

/// Handler bound to the triangle mailbox: intersect, then accumulate.
pub struct TriangleHandler<'a> {
    rows: &'a LocalRows,
    count: AtomicI64,
}

impl<'a> TriangleHandler<'a> {
    pub fn new(rows: &'a LocalRows) -> TriangleHandler<'a> {
        TriangleHandler {
            rows,
            count: AtomicI64::new(0),
        }
    }

    pub fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Handler<Packet> for TriangleHandler<'_> {
    fn process(&self, pkt: Packet, sender_rank: usize) -> Result<()> {
        let row = self
            .rows
            .row(pkt.target_vertex)
            .ok_or_else(|| TcError::PartitionViolation {
                rank: self.rows.rank(),
                target_vertex: pkt.target_vertex,
                local_rows: self.rows.num_local_rows(),
            })?;
        let cnt = sorted_intersection_count(&pkt.payload, row);
        trace!(
            sender_rank,
            target = pkt.target_vertex,
            size = pkt.payload_size(),
            cnt,
            "packet"
        );
        // the dispatch loop runs on another thread than the drain loop
        self.count.fetch_add(cnt as i64, Ordering::Relaxed);
        Ok(())
    }
}

fn check_partition(ctx: &WorkerCtx<'_>, rows: &LocalRows) -> Result<()> {
    if rows.rank() != ctx.rank() || rows.num_workers() != ctx.num_workers() {
        return Err(TcError::InvalidConfig(format!(
            "rows of rank {}/{} handed to worker {}/{}",
            rows.rank(),
            rows.num_workers(),
            ctx.rank(),
            ctx.num_workers()
        )));
    }
    Ok(())
}

/// The per-worker actor: a triangle mailbox plus its lifecycle.
pub struct TriangleActor<'a> {
    selector: Selector<Packet, TriangleHandler<'a>>,
    state: Mutex<ActorState>,
}

impl<'a> TriangleActor<'a> {
    /// Collective: every worker constructs its actor at the same point.
    pub fn new(ctx: &WorkerCtx<'_>, rows: &'a LocalRows) -> Result<TriangleActor<'a>> {
        check_partition(ctx, rows)?;
        Ok(TriangleActor {
            selector: Selector::new(ctx, TriangleHandler::new(rows))?,
            state: Mutex::new(ActorState::Idle),
        })
    }

    pub fn state(&self) -> ActorState {
        *self.state.lock()
    }

    fn transition(&self, from: ActorState, to: ActorState) -> Result<()> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(TcError::InvalidTransition { from: *state, to });
        }
        *state = to;
        debug!(rank = self.selector.rank(), ?from, ?to, "actor transition");
        Ok(())
    }

    /// Enter the receiving state; packets may be handled from here on.
    pub fn start<'scope, 'env>(
        &'env self,
        scope: &'scope FinishScope<'scope, 'env>,
    ) -> Result<Drain<'scope>> {
        self.transition(ActorState::Idle, ActorState::Dispatching)?;
        self.selector.start(scope)
    }

    pub fn send(&self, pkt: Packet, dest: usize) -> Result<()> {
        let state = self.state();
        if state != ActorState::Dispatching {
            return Err(TcError::InvalidTransition {
                from: state,
                to: ActorState::Dispatching,
            });
        }
        self.selector.send(pkt, dest)
    }

    /// No further sends from this worker.
    pub fn done(&self) -> Result<()> {
        self.transition(ActorState::Dispatching, ActorState::LocalDrained)?;
        debug!(
            rank = self.selector.rank(),
            sent = self.selector.num_sent(),
            "dispatch finished"
        );
        self.selector.done()
    }

    /// Announce completion without touching the lifecycle, so peers are never
    /// left waiting on a worker that bailed out.
    fn close(&self) {
        let _ = self.selector.done();
    }

    pub fn enter_barrier(&self) -> Result<()> {
        self.transition(ActorState::LocalDrained, ActorState::BarrierWait)
    }

    pub fn finish(&self) -> Result<()> {
        self.transition(ActorState::BarrierWait, ActorState::Finished)
    }

    /// The local partial count. Only trustworthy once the run has finished.
    pub fn count(&self) -> Result<i64> {
        let state = self.state();
        if state != ActorState::Finished {
            return Err(TcError::InvalidTransition {
                from: state,
                to: ActorState::Finished,
            });
        }
        Ok(self.selector.handler().count())
    }
}

/// Push every local row to the owner of each of its neighbors, one packet
/// per chunk. Returns the number of packets sent.
pub fn dispatch(actor: &TriangleActor<'_>, rows: &LocalRows, chunk_size: usize) -> Result<u64> {
    let num_workers = rows.num_workers();
    let mut sent = 0;
    for (_l_i, row) in rows.rows() {
        for &l_j in row {
            let pe = owner(l_j, num_workers);
            let vj = local_index(l_j, num_workers);
            for chunk in chunks(row, chunk_size) {
                actor.send(
                    Packet {
                        target_vertex: vj,
                        payload: chunk.to_vec(),
                    },
                    pe,
                )?;
                sent += 1;
            }
        }
    }
    Ok(sent)
}

/// Outcome of one run, identical on every worker except `local_count`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TcRun {
    pub triangles: i64,
    pub local_count: i64,
    pub packets_sent: u64,
    pub packets_processed: u64,
    pub laptime: MinAvgMax,
}

/// Count triangles across all workers of the world. Collective.
///
/// The drain loop is started, the local edges are dispatched, completion is
/// announced and the drain loop joined, all inside one finish scope; only
/// after the following barrier are the partial counts reduced.
pub fn triangle_count(ctx: &WorkerCtx<'_>, rows: &LocalRows, chunk_size: usize) -> Result<TcRun> {
    let checked = check_partition(ctx, rows).and_then(|()| match chunk_size {
        0 => Err(TcError::InvalidConfig("chunk size must be positive".to_string())),
        _ => Ok(()),
    });
    // leave together, before any mailbox is opened
    ctx.agree(checked)?;
    let actor = TriangleActor::new(ctx, rows)?;

    ctx.barrier()?;
    let timer = Instant::now();

    let local = finish(|scope| -> Result<(u64, u64)> {
        let drain = actor.start(scope)?;
        let dispatched = dispatch(&actor, rows, chunk_size);
        let announced = actor.done();
        let processed = drain.wait();
        let sent = dispatched?;
        announced?;
        Ok((sent, processed?))
    })
    .and_then(|counts| actor.enter_barrier().map(|()| counts));
    actor.close();
    let laptime = timer.elapsed().as_secs_f64();

    ctx.barrier()?;
    let (sent, processed) = ctx.agree(local)?;
    actor.finish()?;
    let local_count = actor.count()?;
    debug!(
        rank = ctx.rank(),
        sent,
        processed,
        local_count,
        "local run complete"
    );

    Ok(TcRun {
        triangles: ctx.reduce_add_i64(local_count)?,
        local_count,
        packets_sent: ctx.reduce_add_u64(sent)?,
        packets_processed: ctx.reduce_add_u64(processed)?,
        laptime: ctx.min_avg_max(laptime)?,
    })
}

/// Partition `graph` over `config.num_workers` workers and count its triangles.
pub fn count_triangles(graph: &Graph, config: &TcConfig) -> Result<TcRun> {
    config.validate()?;
    let parts = graph.partition(config.num_workers)?;
    let mut runs = World::run(config.num_workers, |ctx| {
        triangle_count(ctx, &parts[ctx.rank()], config.chunk_size)
    })?;
    // reduced fields agree on every rank; report rank 0
    Ok(runs.swap_remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_graph() -> Graph {
        // triangle {0,1,2} plus edge {2,3}
        Graph::from_rows(vec![vec![], vec![0], vec![0, 1], vec![2]]).unwrap()
    }

    #[test]
    fn chunking_reconstructs_rows() {
        let row = (0..10u64).collect::<Vec<_>>();
        for chunk_size in 1..=12 {
            let parts = chunks(&row, chunk_size).collect::<Vec<_>>();
            assert_eq!(parts.len(), (row.len() + chunk_size - 1) / chunk_size);
            assert_eq!(parts.concat(), row);
            let last = parts.last().unwrap().len();
            let expected_last = match row.len() % chunk_size {
                0 => chunk_size,
                r => r,
            };
            assert_eq!(last, expected_last);
        }
        assert_eq!(chunks(&[], 64).count(), 0);
        assert_eq!(chunks(&row[..8], 4).count(), 2);
    }

    #[test]
    fn config_is_validated() {
        assert!(TcConfig::new(0, 64).is_err());
        assert!(TcConfig::new(2, 0).is_err());
        assert_eq!(TcConfig::default().chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn handler_intersects_against_owned_row() {
        let parts = scenario_graph().partition(2).unwrap();
        // worker 0 owns vertex 2 as local row 1: [0, 1]
        let handler = TriangleHandler::new(&parts[0]);
        handler
            .process(
                Packet {
                    target_vertex: 1,
                    payload: vec![0, 1, 5],
                },
                1,
            )
            .unwrap();
        assert_eq!(handler.count(), 2);
    }

    #[test]
    fn handler_rejects_rows_it_does_not_own() {
        let parts = scenario_graph().partition(2).unwrap();
        let handler = TriangleHandler::new(&parts[1]);
        let err = handler
            .process(
                Packet {
                    target_vertex: 2,
                    payload: vec![0],
                },
                0,
            )
            .unwrap_err();
        assert_eq!(
            err,
            TcError::PartitionViolation {
                rank: 1,
                target_vertex: 2,
                local_rows: 2
            }
        );
    }

    #[test]
    fn lifecycle_runs_in_order() {
        let graph = scenario_graph();
        let parts = graph.partition(1).unwrap();
        World::run(1, |ctx| {
            let actor = TriangleActor::new(ctx, &parts[0])?;
            let empty = || Packet {
                target_vertex: 0,
                payload: vec![],
            };
            assert_eq!(actor.state(), ActorState::Idle);
            assert!(actor.send(empty(), 0).is_err());
            assert!(actor.done().is_err());
            assert!(actor.count().is_err());
            finish(|scope| -> Result<()> {
                let drain = actor.start(scope)?;
                assert_eq!(actor.state(), ActorState::Dispatching);
                assert!(actor.start(scope).is_err());
                dispatch(&actor, &parts[0], 1)?;
                actor.done()?;
                assert_eq!(actor.state(), ActorState::LocalDrained);
                assert!(actor.send(empty(), 0).is_err());
                drain.wait()?;
                Ok(())
            })?;
            actor.enter_barrier()?;
            assert!(actor.count().is_err());
            actor.finish()?;
            assert_eq!(actor.state(), ActorState::Finished);
            assert_eq!(actor.count()?, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn four_vertex_scenario_on_two_workers() {
        let run = count_triangles(&scenario_graph(), &TcConfig::new(2, 64).unwrap()).unwrap();
        assert_eq!(run.triangles, 1);
        // one packet per lower-triangular edge
        assert_eq!(run.packets_sent, 4);
        assert_eq!(run.packets_processed, 4);
        // vertex 1 sits on rank 1
        assert_eq!(run.local_count, 0);
    }

    #[test]
    fn single_triangle_over_three_workers() {
        let graph = Graph::from_rows(vec![vec![], vec![0], vec![0, 1]]).unwrap();
        let parts = graph.partition(3).unwrap();
        let runs = World::run(3, |ctx| {
            let rows = &parts[ctx.rank()];
            let actor = TriangleActor::new(ctx, rows)?;
            let sent = finish(|scope| -> Result<u64> {
                let drain = actor.start(scope)?;
                let sent = dispatch(&actor, rows, 64)?;
                actor.done()?;
                drain.wait()?;
                Ok(sent)
            })?;
            ctx.barrier()?;
            actor.enter_barrier()?;
            actor.finish()?;
            Ok((sent, actor.count()?))
        })
        .unwrap();
        // vertex 1 sends row {0} once, vertex 2 sends row {0,1} twice
        assert_eq!(runs.iter().map(|r| r.0).collect::<Vec<_>>(), vec![0, 1, 2]);
        // the triangle is found on the owner of its middle vertex
        assert_eq!(runs.iter().map(|r| r.1).collect::<Vec<_>>(), vec![0, 1, 0]);
    }

    #[test]
    fn zero_edges_send_nothing() {
        let graph = Graph::from_rows(vec![vec![]; 9]).unwrap();
        for num_workers in [1, 2, 4] {
            let run = count_triangles(&graph, &TcConfig::new(num_workers, 64).unwrap()).unwrap();
            assert_eq!(run.triangles, 0);
            assert_eq!(run.packets_sent, 0);
        }
    }

    #[test]
    fn chunk_size_does_not_change_the_count() {
        let graph = Graph::from_edges(
            6,
            vec![(0, 1), (0, 2), (1, 2), (2, 3), (1, 3), (3, 4), (2, 4), (4, 5), (0, 5), (1, 5)],
        )
        .unwrap();
        let expected = graph.brute_force_triangles() as i64;
        let widest = graph.rows().map(|r| r.len()).max().unwrap();
        for chunk_size in [1, 2, widest, 64] {
            for num_workers in [1, 2, 3] {
                let run = count_triangles(&graph, &TcConfig::new(num_workers, chunk_size).unwrap())
                    .unwrap();
                assert_eq!(run.triangles, expected, "chunk {chunk_size} workers {num_workers}");
            }
        }
    }

    #[test]
    fn partition_violation_aborts_every_worker() {
        let graph = scenario_graph();
        let parts = graph.partition(2).unwrap();
        let result = World::run(2, |ctx| {
            let rows = &parts[ctx.rank()];
            let actor = TriangleActor::new(ctx, rows)?;
            let local = finish(|scope| -> Result<()> {
                let drain = actor.start(scope)?;
                if ctx.rank() == 0 {
                    let stray = Packet {
                        target_vertex: 40,
                        payload: vec![1],
                    };
                    actor.send(stray, 1)?;
                }
                actor.done()?;
                drain.wait()?;
                Ok(())
            });
            ctx.barrier()?;
            ctx.agree(local)
        });
        assert_eq!(
            result,
            Err(TcError::PartitionViolation {
                rank: 1,
                target_vertex: 40,
                local_rows: 2
            })
        );
    }
}
