//! Collective operations shared by every worker of a [`World`](super::World).
//!
//! All collectives are blocking rendezvous: every worker must call the same
//! sequence of collectives, in the same order, with the same value type.

use std::any::Any;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::error::{Result, TcError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MinAvgMax {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

type Slot = Option<Box<dyn Any + Send>>;

#[derive(Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    poisoned: bool,
}

pub struct Collectives {
    num_workers: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
    slots: Mutex<Vec<Slot>>,
}

impl Collectives {
    pub fn new(num_workers: usize) -> Collectives {
        Collectives {
            num_workers,
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
            slots: Mutex::new((0..num_workers).map(|_| None).collect()),
        }
    }

    /// Block until every worker has arrived. Fails with `Aborted` once the
    /// collectives are poisoned, including for workers already waiting.
    pub fn barrier(&self, rank: usize) -> Result<()> {
        let mut state = self.state.lock();
        if state.poisoned {
            return Err(TcError::Aborted { rank });
        }
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.num_workers {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            return Ok(());
        }
        while state.generation == generation && !state.poisoned {
            self.released.wait(&mut state);
        }
        if state.generation == generation {
            return Err(TcError::Aborted { rank });
        }
        Ok(())
    }

    /// Release every waiter with an error; no barrier completes afterwards.
    pub fn poison(&self) {
        self.state.lock().poisoned = true;
        self.released.notify_all();
    }

    /// Every worker contributes `value` and receives all contributions in rank order.
    pub fn all_gather<T>(&self, rank: usize, value: T) -> Result<Vec<T>>
    where
        T: Clone + Send + 'static,
    {
        self.slots.lock()[rank] = Some(Box::new(value));
        self.barrier(rank)?;
        let gathered = {
            let slots = self.slots.lock();
            slots
                .iter()
                .map(|slot| slot.as_ref().and_then(|v| v.downcast_ref::<T>()).cloned())
                .collect::<Option<Vec<T>>>()
        };
        self.barrier(rank)?;
        // only the owner ever writes a slot, and every reader is past the barrier
        self.slots.lock()[rank] = None;
        gathered.ok_or_else(|| {
            TcError::Runtime(format!(
                "rank {rank} gathered mismatched values of type {}",
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn reduce_add_i64(&self, rank: usize, value: i64) -> Result<i64> {
        Ok(self.all_gather(rank, value)?.into_iter().sum())
    }

    pub fn reduce_add_u64(&self, rank: usize, value: u64) -> Result<u64> {
        Ok(self.all_gather(rank, value)?.into_iter().sum())
    }

    pub fn any(&self, rank: usize, flag: bool) -> Result<bool> {
        Ok(self.all_gather(rank, flag)?.into_iter().any(|f| f))
    }

    pub fn min_avg_max(&self, rank: usize, value: f64) -> Result<MinAvgMax> {
        let values = self.all_gather(rank, value)?;
        Ok(MinAvgMax {
            min: values.iter().fold(f64::INFINITY, |a, &b| a.min(b)),
            avg: values.iter().sum::<f64>() / values.len() as f64,
            max: values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)),
        })
    }
}
