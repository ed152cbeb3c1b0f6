use rustc_hash::FxHashMap;
use tracing::debug;

use crate::chat::payloads::ImageMetadata;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ImageHandle(pub u64);

/// Where completely received images go, e.g. a texture cache. Decoding the bytes is up to the
///  implementation.
#[cfg_attr(test, mockall::automock)]
pub trait ImageStore: Send {
    fn get_or_create(&mut self, key: &str) -> ImageHandle;
    fn is_loaded(&self, handle: ImageHandle) -> bool;
    fn load(&mut self, handle: ImageHandle, metadata: &ImageMetadata, data: &[u8]) -> anyhow::Result<()>;
}

pub struct StoredImage {
    pub metadata: ImageMetadata,
    pub data: Vec<u8>,
}

/// keeps the raw bytes of every image in memory
#[derive(Default)]
pub struct MemoryImageStore {
    handles: FxHashMap<String, ImageHandle>,
    images: FxHashMap<ImageHandle, StoredImage>,
}

impl MemoryImageStore {
    pub fn new() -> MemoryImageStore {
        MemoryImageStore::default()
    }

    pub fn image(&self, handle: ImageHandle) -> Option<&StoredImage> {
        self.images.get(&handle)
    }
}

impl ImageStore for MemoryImageStore {
    fn get_or_create(&mut self, key: &str) -> ImageHandle {
        let next = ImageHandle(self.handles.len() as u64);
        *self.handles.entry(key.to_string())
            .or_insert(next)
    }

    fn is_loaded(&self, handle: ImageHandle) -> bool {
        self.images.contains_key(&handle)
    }

    fn load(&mut self, handle: ImageHandle, metadata: &ImageMetadata, data: &[u8]) -> anyhow::Result<()> {
        debug!("loaded image {} ({} bytes)", metadata.key, data.len());
        self.images.insert(handle, StoredImage {
            metadata: metadata.clone(),
            data: data.to_vec(),
        });
        Ok(())
    }
}
