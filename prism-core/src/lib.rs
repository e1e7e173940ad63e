pub mod capability;
pub mod device_map;
pub mod error;
pub mod filters;
pub mod gemini;
pub mod media;
pub mod pipeline;
pub mod presets;
pub mod registry;
pub mod remote;
pub mod request;
mod util;

pub use capability::*;
pub use device_map::*;
pub use error::{Error, Result};
pub use filters::*;
pub use gemini::{GeminiClient, Part, VisionLanguage};
pub use media::*;
pub use pipeline::*;
pub use presets::*;
pub use registry::*;
pub use remote::*;
pub use request::*;
pub use util::*;
