//! Concrete image backends.

pub mod openai_images;
pub mod pollinations;
pub mod seedream;

pub use openai_images::OpenAiImagesClient;
pub use pollinations::PollinationsClient;
pub use seedream::SeedreamClient;
