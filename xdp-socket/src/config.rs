//! # Framework Configuration
//!
//! ## Purpose
//!
//! Everything the control plane needs before touching any kernel state:
//! the ordered interface list, working mode, frame size, batch size, worker
//! count, and the handful of boolean flags the CLI surface exposes.
//!
//! ## How it works
//!
//! `Config` derives `clap::Parser` directly over the CLI surface. `-i/--iface`
//! is repeatable and accepts an optional `:c`/`:z` suffix forcing a bind
//! mode per interface, parsed by a small custom `value_parser`. `validate()`
//! runs once, before any kernel state is created, and turns every
//! configuration-error case into a `FrameworkError::Configuration`.
//!
//! ## Main components
//!
//! - `Config`: the `clap::Parser` CLI surface.
//! - `IfaceConfig`/`BindMode`: one entry per `-i` flag.
//! - `WorkingMode`: `AF_XDP` | `XDP` | `COMBINED`.

use crate::error::FrameworkError;
use clap::Parser;

/// Per-interface bind-mode hint, from the optional `:c`/`:z` suffix on `-i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindMode {
    #[default]
    Auto,
    Copy,
    ZeroCopy,
}

/// One `-i/--iface name[:c|z]` entry.
#[derive(Debug, Clone)]
pub struct IfaceConfig {
    pub name: String,
    pub bind_mode: BindMode,
}

fn parse_iface(s: &str) -> Result<IfaceConfig, String> {
    match s.split_once(':') {
        Some((name, "c")) => Ok(IfaceConfig { name: name.to_string(), bind_mode: BindMode::Copy }),
        Some((name, "z")) => {
            Ok(IfaceConfig { name: name.to_string(), bind_mode: BindMode::ZeroCopy })
        }
        Some((_, suffix)) => Err(format!("unknown bind-mode suffix ':{suffix}', expected ':c' or ':z'")),
        None => Ok(IfaceConfig { name: s.to_string(), bind_mode: BindMode::Auto }),
    }
}

/// Working mode: whether an XDP program (and optionally a TC egress filter)
/// is loaded and attached in addition to the AF_XDP sockets themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Default)]
pub enum WorkingMode {
    #[default]
    AfXdp,
    Xdp,
    Combined,
}

/// The complete CLI surface, parsed with `clap::Parser`.
#[derive(Debug, Parser, Clone)]
#[command(author, version, about)]
pub struct Config {
    /// Add an interface; optional `:c` forces copy mode, `:z` forces zero-copy.
    #[arg(short = 'i', long = "iface", value_parser = parse_iface, required = true)]
    pub interfaces: Vec<IfaceConfig>,

    /// Use poll() between batches.
    #[arg(short = 'p', long = "poll")]
    pub poll: bool,

    /// Attach XDP in SKB (generic) mode; forces copy.
    #[arg(short = 'S', long = "xdp-skb")]
    pub xdp_skb: bool,

    /// UMEM frame size (power of two unless --unaligned).
    #[arg(short = 'f', long = "frame-size", default_value_t = 4096)]
    pub frame_size: u32,

    /// Enable unaligned chunk placement; enables huge-page backing.
    #[arg(short = 'u', long = "unaligned")]
    pub unaligned: bool,

    /// Rx/tx batch size (1..511).
    #[arg(short = 'b', long = "batch-size", default_value_t = 64)]
    pub batch_size: u32,

    /// Enable socket busy-poll.
    #[arg(short = 'B', long = "busy-poll")]
    pub busy_poll: bool,

    /// Working mode.
    #[arg(short = 'M', long = "mode", value_enum, default_value_t = WorkingMode::AfXdp)]
    pub mode: WorkingMode,

    /// Number of worker threads.
    #[arg(short = 'w', long = "workers", default_value_t = 1)]
    pub workers: u32,

    /// Path to the eBPF object to load for XDP/COMBINED modes; defaults to
    /// `{argv0}_kern.o` when unset.
    #[arg(long = "ebpf-object")]
    pub ebpf_filename: Option<String>,

    /// XDP program name inside the eBPF object.
    #[arg(long = "xdp-prog", default_value = "xdp_prog")]
    pub xdp_prog_name: String,

    /// TC egress program name inside the eBPF object; if set, a `clsact`
    /// qdisc and direct-action filter are installed on every interface.
    #[arg(long = "tc-prog")]
    pub tc_prog_name: Option<String>,
}

/// Thin wrapper matching the `parse_args(argc, argv, &config)` shape: ordinary
/// `clap::Parser::parse_from` underneath.
pub fn parse_args<I, T>(args: I) -> Config
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Config::parse_from(args)
}

impl Config {
    /// Resolves the eBPF object path, defaulting to `{argv0}_kern.o`.
    pub fn ebpf_filename(&self, argv0: &str) -> String {
        self.ebpf_filename
            .clone()
            .unwrap_or_else(|| format!("{argv0}_kern.o"))
    }

    /// Validates everything that can be checked without touching kernel
    /// state: frame size alignment, batch size bounds, worker count, and
    /// that the configured worker count does not exceed the process's CPU
    /// affinity mask (checked again at `start_workers` time, since affinity
    /// can change between validation and spawn).
    pub fn validate(&self) -> Result<(), FrameworkError> {
        if self.interfaces.is_empty() {
            return Err(FrameworkError::Configuration("no interfaces configured".into()));
        }
        if !self.unaligned && !self.frame_size.is_power_of_two() {
            return Err(FrameworkError::Configuration(format!(
                "frame size {} must be a power of two unless --unaligned is set",
                self.frame_size
            )));
        }
        if self.batch_size == 0 || self.batch_size > 511 {
            return Err(FrameworkError::Configuration(format!(
                "batch size {} must be in 1..=511",
                self.batch_size
            )));
        }
        if self.workers == 0 {
            return Err(FrameworkError::Configuration("worker count must be at least 1".into()));
        }
        if self.mode != WorkingMode::AfXdp && self.ebpf_filename.is_none() {
            log::debug!(
                "no --ebpf-object given for mode {:?}; will default to '{{argv0}}_kern.o'",
                self.mode
            );
        }
        Ok(())
    }
}
