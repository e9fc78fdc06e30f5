//! Command transport and the per-connection worker.
//!
//! Producers build a [`Command`] with fully owned arguments and push it onto
//! a [`CommandQueue`]. Exactly one worker thread pops from each queue, runs
//! the command against its engine handle and mails the reply.

mod command;
mod executor;
mod queue;

pub use command::{Command, Request, RequestOp};
pub(crate) use executor::Worker;
pub use queue::CommandQueue;
