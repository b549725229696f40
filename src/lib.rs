//! Waits for asynchronous cloud API actions to reach a terminal state.
//!
//! A mutating API call (enable backup, create server, ...) returns one or more
//! [`action::Action`]s that keep running on the provider side. The
//! [`waiter::ActionWaiter`] polls their status until every one has finished,
//! streams progress to a [`progress::ProgressSink`], and folds failures into a
//! single [`error::WaitError`].

pub mod action;
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod poller;
pub mod progress;
pub mod waiter;

#[cfg(test)]
mod testing;
