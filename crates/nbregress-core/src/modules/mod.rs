pub mod discovery;
pub mod executor;
pub mod grading;
pub mod hashing;
pub mod image;
pub mod numeric;
pub mod regression;
pub mod table;

mod artifacts;
mod traits;

pub use artifacts::CompareError;
pub use traits::{NotebookExecutor, TextGenerator};
