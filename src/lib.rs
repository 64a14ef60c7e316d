//! # tensorsched
//!
//! Turns a lazily-built tensor op graph into an ordered sequence of fused
//! kernel computations.
//!
//! ## Pipeline
//!
//! ```text
//! UOp graph (SINK root)
//!     ↓
//! [validate]             → tensor-IR structural invariants hold
//!     ↓
//! [fold]                 → constant folding, identity elimination,
//!                           adjacent-view merging, BIND resolution
//!     ↓
//! [build_context]        → reverse edges, buffer/assign indexes
//!     ↓
//! [group_realizes]       → which nodes become their own kernel
//!     ↓
//! [inject_buffers]       → mint/attach backing buffers for each realize
//!     ↓
//! [merge_assign_buffers] → alias in-place ASSIGN targets
//!     ↓
//! [schedule_uop] × N     → lower each realize to a kernel AST
//!     ↓
//! [topological_sort]     → deterministic kernel execution order
//!     ↓
//! Vec<ScheduleItem>
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tensorsched::{create_schedule_default, op::UOp};
//!
//! let sink = build_graph(); // construct a SINK-rooted UOp graph
//! let (items, var_vals, becomes_map) = create_schedule_default(&sink)?;
//! for item in &items {
//!     println!("kernel with {} buffers", item.bufs.len());
//! }
//! ```
//!
//! ## Configuration
//!
//! [`config::SchedulerConfig`] is loaded from `TENSORSCHED_*` environment
//! variables via [`config::SchedulerConfig::from_env`]; see that module for
//! the full list of knobs.
//!
//! ## Logging
//!
//! Every pass emits `tracing` spans/events at `debug`; `create_schedule`
//! emits one `info` summary when `debug_level >= 1`. Wire up
//! `tracing-subscriber` in a binary to see them:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```

pub mod buffer;
pub mod buffer_injection;
pub mod buffer_merge;
pub mod config;
pub mod context;
pub mod dtype;
pub mod error;
pub mod folding;
pub mod fusion;
pub mod kernel_lowering;
pub mod metadata;
pub mod op;
pub mod rewrite;
pub mod schedule;
pub mod shapetracker;
pub mod validator;

pub use config::SchedulerConfig;
pub use error::ScheduleError;
pub use schedule::{create_schedule, create_schedule_default, replay_cache, ScheduleItem};
