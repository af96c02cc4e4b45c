//! Services used by the HTTP layer
//!
//! - [`codec`]: inline payload decoding, dimension limits and PNG encoding
//! - [`fetch`]: remote image retrieval

pub mod codec;
pub mod fetch;

pub use codec::{DecodedImage, ImageCodec};
pub use fetch::{HttpImageFetcher, ImageFetcher};
