pub mod cache;
pub mod catalogue;
pub mod codec;
pub mod container;
pub mod disk_cache;
pub mod loader;

pub use cache::RenderedCache;
pub use catalogue::CodecCatalogue;
pub use codec::{CodecError, ImageCodec, ImageCrateCodec, WebpCodec};
pub use container::ImageContainer;
pub use disk_cache::{DiskCache, DiskCacheError};
pub use loader::{DecodeError, DecodeRequest, decode_off_thread, decode_sync, scale_off_thread};
