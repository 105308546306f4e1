//! Generation pipeline: payload building, the HTTP service adapter, response
//! normalization, download encoding and the generator that ties them to a
//! session.

pub mod builder;
pub mod config;
pub mod encoder;
pub mod generator;
pub mod normalizer;
pub mod service;

mod util;

pub use builder::{build, Payload};
pub use config::EngineConfig;
pub use encoder::{download_file_name, encode, EncodedImage};
pub use generator::{GenerationOutcome, Generator};
pub use normalizer::{normalize, NormalizeContext, NormalizedBatch};
pub use service::{ImageFetcher, ImageService, OpenAiImageService};
