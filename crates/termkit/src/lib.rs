//! # termkit
//!
//! Terminal UI toolkit for CLI applications.
//!
//! - **Messages**: Consistent info, warning, error, and success output
//! - **Layout**: Headers, sections, key-value pairs, aligned tables
//! - **Progress**: Spinners and progress bars
//! - **Formatting**: Durations, truncation, plurals
//!
//! ## Quick Start
//!
//! ```no_run
//! use termkit::{format, layout, messages, progress};
//!
//! messages::info("Submitting 5 resources");
//!
//! let mut table = layout::Table::new(["KIND", "NAME", "RESULT"]);
//! table.row(["Service", "nfs-provisioner", "accepted"]);
//! table.print();
//!
//! let bar = progress::bar(5, "Submitting");
//! bar.inc(1);
//! progress::finish_success(&bar, "Done");
//!
//! assert_eq!(format::plural(2, "change"), "2 changes");
//! ```
//!
//! Symbols: success ✓ (green), error ✗ (red), warning ⚠ (yellow), info ℹ (blue).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format;
pub mod layout;
pub mod messages;
pub mod progress;

// Re-export commonly used items at crate root for convenience
pub use format::{human_duration, plural, truncate};
pub use layout::{Table, header, kv, section};
pub use messages::{dim, error, info, success, warn};
pub use progress::spinner;
