//! svscan-rs: detect structural variants from anomalous read pairs.
//!
//! # Library usage
//!
//! ```no_run
//! use svscan_rs::{Detector, Options, Read};
//! use svscan_rs::config::{BamConfig, LibraryInfo};
//!
//! // Load a library configuration and profile the inputs.
//! // let cfg = BamConfig::load(path_to_config)?;
//! // let info: LibraryInfo = /* profiling pre-pass over the BAMs */;
//! //
//! // let mut detector = Detector::new(&opts, &cfg, &info, ref_names, out);
//! // for read in classified_stream {
//! //     detector.push(read);
//! // }
//! // detector.finish()?;
//! ```

// Internal modules — not part of the public API.
pub(crate) mod emit;
pub(crate) mod types;

// Public modules — stable API surface.
pub mod bam_input;
pub mod classify;
pub mod config;
pub mod detect;
pub mod profile;
pub mod read;
pub mod region;
pub mod stats;
pub mod sv;

// Flat re-exports for the most commonly used public types.
pub use config::{BamConfig, LibraryConfig, LibraryInfo, Options};
pub use detect::{Detector, Stats};
pub use read::{Orientation, PairFlag, Read};

// Re-exports needed by integration tests in tests/.
#[doc(hidden)]
pub use bam_input::initial_flag;
#[doc(hidden)]
pub use region::RegionStore;
