//! Services module - the core logic of the patcher.
//!
//! The services are framework-agnostic and have no dependencies on the CLI
//! layer, making them testable and reusable.
//!
//! # Components
//!
//! - [`fsops`]: Resilient filesystem primitives. Directory creation, recursive
//!   deletion with read-only clearing, and source tree copying, all with a
//!   bounded busy-retry loop that tolerates transient lock contention
//!   (antivirus scanners, slow handle release) instead of failing immediately.
//!
//! - [`RuleEngine`]: The ordered rewrite rule list. Item extraction gates the
//!   sequence; loading-speed and reliability substitutions and the
//!   per-category cost-factor rules each take an immutable text snapshot and
//!   produce new text plus a structured [`RuleOutcome`].
//!
//! - [`TransformEngine`]: Walks the markup files, applies the rule sequence
//!   file-at-a-time, writes mutated files back, and appends generated switch
//!   blocks to the paired companion graphics files.
//!
//! - [`PrepareService`]: One-time source preparation. Inserts the running cost
//!   parameter blocks and the coach loading-speed define at their regex
//!   anchors (missing anchor is fatal) and appends the parameter string table
//!   to the language files.
//!
//! # Design Philosophy
//!
//! - **Synchronous**: Single-threaded, blocking I/O, file-at-a-time. The only
//!   concurrency-adjacent behavior is the bounded retry loop in [`fsops`].
//! - **Pure rules**: Rules never mutate shared state; each returns a new text
//!   and an outcome, which keeps them independently testable.
//! - **Explicit preconditions**: Category gating is done on the extracted item
//!   name against configured prefix lists, not through regex lookahead.

pub mod fsops;
pub mod prepare;
pub mod rules;
pub mod transform;

pub use fsops::FsOpError;
pub use prepare::{PrepareError, PrepareService};
pub use rules::{Classifier, FilePatch, RuleEngine, RuleOutcome, purchase_cost_factor};
pub use transform::{TransformEngine, TransformError};
