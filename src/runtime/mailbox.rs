//! Selector style mailboxes: one message kind, one handler, fire-and-forget sends.
//!
//! Every worker opens its own [`Selector`] collectively, so each one holds a
//! sender to every worker's inbox. A started selector drains its inbox on a
//! task of its own, invoking the [`Handler`] once per message, one message at
//! a time.
//!
//! Termination is completion counted: [`Selector::done`] puts a completion
//! marker behind the worker's last message in every inbox. Channels are FIFO
//! per sender, so once a drain loop has seen a marker from every worker, every
//! message addressed to it has been handled.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::ScopedJoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{error, trace};

use super::{FinishScope, WorkerCtx};
use crate::error::{Result, TcError};

/// Code run by the receiving worker for each arriving message.
pub trait Handler<M>: Sync {
    fn process(&self, msg: M, sender_rank: usize) -> Result<()>;
}

enum Envelope<M> {
    Msg { from: usize, msg: M },
    Done { from: usize },
}

pub struct Selector<M, H> {
    rank: usize,
    outboxes: Vec<Sender<Envelope<M>>>,
    inbox: Receiver<Envelope<M>>,
    handler: H,
    sent: AtomicU64,
    started: AtomicBool,
    done: AtomicBool,
}

/// Completion announcement, independent of the message type.
trait Announce {
    fn announce(&self);
}

/// The running drain loop of a started [`Selector`].
///
/// Dropping it without [`Drain::wait`], as happens when the owning worker
/// unwinds, announces completion so the scope can still join every drain loop.
pub struct Drain<'scope> {
    handle: Option<ScopedJoinHandle<'scope, Result<u64>>>,
    selector: &'scope (dyn Announce + 'scope),
    rank: usize,
}

impl<'scope> Drain<'scope> {
    /// Block until every worker has announced completion and every message
    /// sent here has been handled. Returns the number of messages handled.
    pub fn wait(mut self) -> Result<u64> {
        let rank = self.rank;
        let handle = self.handle.take().ok_or_else(|| {
            TcError::Runtime(format!("drain loop on rank {rank} already joined"))
        })?;
        handle.join().unwrap_or_else(|_| {
            Err(TcError::Runtime(format!("drain loop on rank {rank} panicked")))
        })
    }
}

impl Drop for Drain<'_> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.selector.announce();
        }
    }
}

impl<M, H> Selector<M, H>
where
    M: Send + 'static,
    H: Handler<M>,
{
    /// Collective: every worker must open its selector at the same point.
    pub fn new(ctx: &WorkerCtx<'_>, handler: H) -> Result<Selector<M, H>> {
        let (tx, rx) = unbounded();
        let outboxes = ctx.all_gather(tx)?;
        Ok(Selector {
            rank: ctx.rank(),
            outboxes,
            inbox: rx,
            handler,
            sent: AtomicU64::new(0),
            started: AtomicBool::new(false),
            done: AtomicBool::new(false),
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn num_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Spawn the drain loop on `scope`. From here on the handler may run
    /// concurrently with the caller's own sends.
    pub fn start<'scope, 'env>(
        &'env self,
        scope: &'scope FinishScope<'scope, 'env>,
    ) -> Result<Drain<'scope>> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(TcError::Runtime(format!(
                "mailbox on rank {} started twice",
                self.rank
            )));
        }
        Ok(Drain {
            handle: Some(scope.spawn(move || self.drain())),
            selector: self,
            rank: self.rank,
        })
    }

    /// Queue `msg` for `dest`. Never blocks and never waits for delivery.
    pub fn send(&self, msg: M, dest: usize) -> Result<()> {
        if self.done.load(Ordering::Acquire) {
            return Err(TcError::Runtime(format!(
                "rank {} sent after announcing done",
                self.rank
            )));
        }
        let outbox = self.outboxes.get(dest).ok_or_else(|| {
            TcError::Runtime(format!(
                "destination rank {dest} outside 0..{}",
                self.outboxes.len()
            ))
        })?;
        outbox
            .send(Envelope::Msg {
                from: self.rank,
                msg,
            })
            .map_err(|_| TcError::MailboxClosed { rank: dest })?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Announce that this worker sends nothing more. Idempotent.
    pub fn done(&self) -> Result<()> {
        if self.done.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut closed = None;
        for (dest, outbox) in self.outboxes.iter().enumerate() {
            if outbox.send(Envelope::Done { from: self.rank }).is_err() {
                closed.get_or_insert(TcError::MailboxClosed { rank: dest });
            }
        }
        closed.map_or(Ok(()), Err)
    }

    fn drain(&self) -> Result<u64> {
        let mut outstanding = self.outboxes.len();
        let mut processed = 0;
        let mut fault = None;
        while outstanding > 0 {
            match self.inbox.recv() {
                Ok(Envelope::Msg { from, msg }) => {
                    // after a fault keep draining so senders never see a closed inbox
                    if fault.is_some() {
                        continue;
                    }
                    match self.handler.process(msg, from) {
                        Ok(()) => processed += 1,
                        Err(e) => {
                            error!(rank = self.rank, from, "{e}");
                            fault = Some(e);
                        }
                    }
                }
                Ok(Envelope::Done { from }) => {
                    outstanding -= 1;
                    trace!(rank = self.rank, from, outstanding, "completion marker");
                }
                Err(_) => return Err(TcError::MailboxClosed { rank: self.rank }),
            }
        }
        fault.map_or(Ok(processed), Err)
    }
}

impl<M, H> Selector<M, H> {
    fn announce_done(&self) {
        // peers are waiting on our marker even if we bailed out early
        if !self.done.swap(true, Ordering::AcqRel) {
            for outbox in &self.outboxes {
                let _ = outbox.send(Envelope::Done { from: self.rank });
            }
        }
    }
}

impl<M, H> Announce for Selector<M, H> {
    fn announce(&self) {
        self.announce_done();
    }
}

impl<M, H> Drop for Selector<M, H> {
    fn drop(&mut self) {
        self.announce_done();
    }
}
