//! # Framework Error Types
//!
//! ## Purpose
//!
//! Control-path failures (anything that happens during `init`, `start_workers`,
//! or `cleanup`) are surfaced through a single typed enum so the fatal-exit
//! helper can log a consistent message and the caller can match on error class
//! where it matters (configuration vs kernel-setup vs an internal invariant
//! break). The data path never constructs this type: it either ignores a
//! transient errno inline or aborts on a contract violation.
//!
//! ## Main components
//!
//! - `FrameworkError`: the five error kinds from the control-path design.

use std::io;
use std::panic::Location;

/// Control-path error, one variant per failure class.
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    /// Bad configuration, caught before any kernel state is touched.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// UMEM/socket creation, XDP attach, or netlink qdisc/filter install failed.
    #[error("kernel setup failed: {0}")]
    KernelSetup(String),

    /// A programming invariant was violated (partial ring reservation, an
    /// out-of-range classifier return value). Always a fatal bug, never a
    /// condition the caller should try to recover from.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// A statistics read failed; surfaced to the caller but never fatal.
    #[error("failed to read socket stats: {0}")]
    StatsRead(String),

    /// Any other I/O failure on the control path.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Logs `err` with the caller's file/line and the process exits with code 1.
///
/// This is the single fatal-exit helper every control-path failure funnels
/// through, per §7's propagation policy: configuration and kernel-setup
/// errors are never retried, only reported and exited. Call sites pass
/// `&mut framework` so `cleanup` runs before the process goes down, even on
/// a partially-initialized `Framework`.
#[track_caller]
pub fn fatal_exit(err: anyhow::Error, framework: &mut crate::control::Framework) -> ! {
    let location = Location::caller();
    log::error!("{err:#} at {}:{}", location.file(), location.line());
    if let Err(cleanup_err) = framework.cleanup() {
        log::error!("cleanup also failed: {cleanup_err}");
    }
    std::process::exit(1);
}
