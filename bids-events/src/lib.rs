//! BIDS Events Library
//!
//! A stateless, reusable library for rebuilding BIDS `*_events.tsv` files from
//! per-subject source timing tables exported by the stimulus presentation
//! software.
//!
//! # Architecture
//!
//! Every subject/run is an independent unit:
//! - Locate the subject's source table by ID prefix and read its trials
//! - Classify each trial against an ordered set of condition rules
//! - Expand matched trials into primary (and optionally rating) events
//! - Sort by onset and replace the destination events file
//!
//! The library does NOT:
//! - Initialise logging
//! - Decide which units to run or in what order
//! - Create missing dataset directories
//!
//! Batch driving and configuration files live in the application layer
//! (bids-events-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use bids_events::{BidsLayout, DurationPolicy, EventFiller, EventsLayout, TransformConfig};
//! use std::path::Path;
//!
//! let config = TransformConfig::new(DurationPolicy::SourceDuration)
//!     .with_rating_events(true);
//! let filler = EventFiller::new(config).unwrap();
//!
//! let layout = BidsLayout::index(Path::new("/data/bids")).unwrap();
//! for target in layout.event_files() {
//!     match filler.process_unit(&target, Path::new("/data/onsets")) {
//!         Ok(report) => println!("{}: {} events", report.key, report.events_written),
//!         Err(e) => eprintln!("{}: {}", target.key, e),
//!     }
//! }
//! ```

// Public modules
pub mod config;
pub mod expander;
pub mod layout;
pub mod pipeline;
pub mod rules;
pub mod source;
pub mod types;
pub mod writer;

// Re-export main types for convenience
pub use config::{DurationPolicy, EventMode, ReactionTimeUnit, TransformConfig};
pub use layout::{BidsLayout, EventsLayout, EventsTarget};
pub use pipeline::{EventFiller, UnitReport};
pub use rules::{ConditionRule, IntrusionPattern, RuleSet, StringPattern};
pub use source::SourceOptions;
pub use types::{EventsError, OutputEvent, RawTrialRecord, Result, RunKey};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
