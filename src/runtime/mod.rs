//! A small in-process actor runtime.
//!
//! A [`World`] runs a fixed number of workers, one thread each, that share
//! nothing but [`collectives`] and [`mailbox`] channels. Work is addressed to a
//! worker by rank, the same way a PE is addressed in a distributed run.

pub mod collectives;
pub mod mailbox;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::Scope;

use tracing::{error, info_span};

use crate::error::{Result, TcError};
use collectives::{Collectives, MinAvgMax};

pub use std::thread::Scope as FinishScope;

/// Structured concurrency boundary: every task spawned on the scope has
/// completed by the time `finish` returns.
pub fn finish<'env, F, R>(f: F) -> R
where
    F: for<'scope> FnOnce(&'scope Scope<'scope, 'env>) -> R,
{
    std::thread::scope(f)
}

/// Handle a worker uses to identify itself and take part in collectives.
pub struct WorkerCtx<'w> {
    rank: usize,
    num_workers: usize,
    collectives: &'w Collectives,
}

impl<'w> WorkerCtx<'w> {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn barrier(&self) -> Result<()> {
        self.collectives.barrier(self.rank)
    }

    pub fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> Result<Vec<T>> {
        self.collectives.all_gather(self.rank, value)
    }

    pub fn reduce_add_i64(&self, value: i64) -> Result<i64> {
        self.collectives.reduce_add_i64(self.rank, value)
    }

    pub fn reduce_add_u64(&self, value: u64) -> Result<u64> {
        self.collectives.reduce_add_u64(self.rank, value)
    }

    pub fn min_avg_max(&self, value: f64) -> Result<MinAvgMax> {
        self.collectives.min_avg_max(self.rank, value)
    }

    /// Agree on the outcome of a phase. If any worker failed, the failing
    /// worker gets its own error back and every other worker gets `Aborted`.
    pub fn agree<T>(&self, local: Result<T>) -> Result<T> {
        let failed = self.collectives.any(self.rank, local.is_err())?;
        match local {
            Err(e) => Err(e),
            Ok(_) if failed => Err(TcError::Aborted { rank: self.rank }),
            Ok(v) => Ok(v),
        }
    }
}

pub struct World;

impl World {
    /// Run `f` once on each of `num_workers` workers and collect the results
    /// in rank order. If any worker fails, the root cause is returned.
    ///
    /// A worker that panics or returns an error poisons the collectives, so
    /// workers still waiting on it leave with `Aborted` instead of hanging.
    pub fn run<T, F>(num_workers: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&WorkerCtx<'_>) -> Result<T> + Sync,
    {
        if num_workers == 0 {
            return Err(TcError::InvalidConfig(
                "a world needs at least one worker".to_string(),
            ));
        }
        let collectives = Collectives::new(num_workers);
        let results: Vec<Result<T>> = std::thread::scope(|s| {
            let handles = (0..num_workers)
                .map(|rank| {
                    let (f, collectives) = (&f, &collectives);
                    s.spawn(move || {
                        let _span = info_span!("worker", rank).entered();
                        let ctx = WorkerCtx {
                            rank,
                            num_workers,
                            collectives,
                        };
                        let result = catch_unwind(AssertUnwindSafe(|| f(&ctx)))
                            .unwrap_or_else(|_| {
                                error!(rank, "worker panicked");
                                Err(TcError::Runtime(format!("worker {rank} panicked")))
                            });
                        if result.is_err() {
                            collectives.poison();
                        }
                        result
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .enumerate()
                .map(|(rank, h)| {
                    h.join().unwrap_or_else(|_| {
                        Err(TcError::Runtime(format!("worker {rank} panicked")))
                    })
                })
                .collect()
        });

        let mut values = Vec::with_capacity(num_workers);
        let mut failure: Option<TcError> = None;
        for result in results {
            match result {
                Ok(v) => values.push(v),
                Err(e) => {
                    let replace = match &failure {
                        None => true,
                        Some(prev) => !prev.is_root_cause() && e.is_root_cause(),
                    };
                    if replace {
                        failure = Some(e);
                    }
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(values),
        }
    }
}
