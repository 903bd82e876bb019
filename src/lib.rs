pub mod classify;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod page_range;
pub mod pages;
pub mod pipeline;
pub mod policy;
pub mod postprocess;
pub mod report;
pub mod resources;
pub mod util;
pub mod validate;

pub use error::{ConvertError, ErrorKind};
pub use job::{ConversionJob, ConversionResult, Format, JobOptions};
pub use page_range::{PageRangeSpec, parse as parse_page_spec};
pub use pipeline::{JobOutput, Pipeline, SplitOutput};
pub use resources::ResourceManager;
