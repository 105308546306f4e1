mod formats;
mod registry;

pub use formats::{OutputFormat, ResponseEncoding};
pub use registry::{
    ModelCapability, ModelRegistry, BASE_FIELDS, DALL_E_2, DALL_E_3, GPT_IMAGE_1,
};
