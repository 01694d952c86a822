pub mod output;
pub mod progress;
pub mod reporter;

pub use output::{OutputFormatter, OutputMode};
pub use progress::ProgressManager;
pub use reporter::ErrorReporter;
