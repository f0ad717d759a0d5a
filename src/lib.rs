// Empirical OpenMP parallelization search.
//
// Inserts one directive at a time before a chosen source line, rewrites the
// thread-count declaration, rebuilds and runs the program through its
// makefile, and reports the fastest combination with speedup and efficiency
// against the untouched sequential build.

pub mod analyzer;
pub mod config;
pub mod cycle;
pub mod error;
pub mod mutator;
pub mod report;
pub mod sweep;

pub use analyzer::{find_optimal, OptimalResult};
pub use config::{Cli, Settings};
pub use cycle::{measure, Bench, Toolchain};
pub use error::{AnalysisError, ConfigError, Error, MeasurementError};
pub use mutator::SourceSnapshot;
pub use report::Reporter;
pub use sweep::{Axes, Configuration, FailurePolicy, ResultSpace, Sweep, Target};
