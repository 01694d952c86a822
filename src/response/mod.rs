pub mod classifier;
pub mod envelope;

pub use classifier::{classify, Outcome};
pub use envelope::{ServiceFailure, ServiceResponse};
