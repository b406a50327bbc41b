use std::path::Path;

use crate::backend::Backend;

/// Decodes `bytes` and uploads the result. Returns `None` if the image cannot
/// be decoded or does not fit on the device.
pub fn load_texture<B: Backend>(device: &B, bytes: &[u8]) -> Option<B::Texture> {
    let image = match image::load_from_memory(bytes) {
        Ok(image) => image.into_rgba8(),
        Err(err) => {
            tracing::warn!(%err, len = bytes.len(), "source image did not decode");
            return None;
        }
    };
    match device.upload(&image) {
        Ok(texture) => Some(texture),
        Err(err) => {
            tracing::warn!(
                %err,
                width = image.width(),
                height = image.height(),
                "source image upload failed"
            );
            None
        }
    }
}

pub fn open_texture<B: Backend>(device: &B, path: &Path) -> Option<B::Texture> {
    match std::fs::read(path) {
        Ok(bytes) => load_texture(device, &bytes),
        Err(err) => {
            tracing::warn!(%err, path = %path.display(), "source image unreadable");
            None
        }
    }
}
