//! Service layer
//!
//! Each service owns one concern of the pipeline so that the batch runner,
//! the link collector and the tests can swap implementations freely.

pub mod compositor;
pub mod fetch;
pub mod io;
pub mod matting;
pub mod progress;

#[cfg(test)]
pub(crate) mod test_utils;

pub use compositor::{flatten_onto_white, Compositor};
pub use fetch::{is_valid_url, HttpFetcher, ImageFetcher};
pub use io::ImageIOService;
pub use matting::{BackgroundRemover, HttpMattingService};
pub use progress::{NoOpProgressReporter, ProgressReporter, TracingProgressReporter};
