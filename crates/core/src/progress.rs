//! Progress reporting for long-running estimations
//!
//! Drivers report a status message and a completed fraction. Both calls
//! return [`ControlFlow`]; answering `Break` asks the driver to stop at the
//! next safe point, which then fails with [`Error::Cancelled`](crate::Error::Cancelled).
//! Reporting never influences the computed result.

use crate::error::{Error, Result};
use std::ops::ControlFlow;

/// Receiver of progress notifications
pub trait Progress {
    /// Report a human-readable status message
    fn set_message(&mut self, _message: &str) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// Report the completed fraction of the current stage, in `[0, 1]`
    fn set_fraction(&mut self, _fraction: f64) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Progress receiver that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Progress for Silent {}

/// Adapts a pair of closures into a [`Progress`] receiver.
///
/// ```ignore
/// let mut log = Vec::new();
/// let mut progress = FnProgress::new(
///     |msg: &str| { log.push(msg.to_string()); ControlFlow::Continue(()) },
///     |_f: f64| ControlFlow::Continue(()),
/// );
/// ```
pub struct FnProgress<M, F> {
    on_message: M,
    on_fraction: F,
}

impl<M, F> FnProgress<M, F>
where
    M: FnMut(&str) -> ControlFlow<()>,
    F: FnMut(f64) -> ControlFlow<()>,
{
    pub fn new(on_message: M, on_fraction: F) -> Self {
        Self {
            on_message,
            on_fraction,
        }
    }
}

impl<M, F> Progress for FnProgress<M, F>
where
    M: FnMut(&str) -> ControlFlow<()>,
    F: FnMut(f64) -> ControlFlow<()>,
{
    fn set_message(&mut self, message: &str) -> ControlFlow<()> {
        (self.on_message)(message)
    }

    fn set_fraction(&mut self, fraction: f64) -> ControlFlow<()> {
        (self.on_fraction)(fraction)
    }
}

impl<P: Progress + ?Sized> Progress for &mut P {
    fn set_message(&mut self, message: &str) -> ControlFlow<()> {
        (**self).set_message(message)
    }

    fn set_fraction(&mut self, fraction: f64) -> ControlFlow<()> {
        (**self).set_fraction(fraction)
    }
}

/// Turn a progress answer into a result, mapping `Break` to [`Error::Cancelled`]
pub fn proceed(flow: ControlFlow<()>) -> Result<()> {
    match flow {
        ControlFlow::Continue(()) => Ok(()),
        ControlFlow::Break(()) => Err(Error::Cancelled),
    }
}
