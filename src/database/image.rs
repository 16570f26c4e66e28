use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{
    error::{ApiError, QueryError},
    IMAGE_FORMATS, RECIPE_IMAGE_DIR,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

/// Decodes an inline image: either a `data:image/...;base64,` URI or bare base64.
/// The format is taken from the decoded bytes, a declared mime type must agree with it.
pub fn decode_image(data: &str) -> Result<DecodedImage, ApiError> {
    let data = data.trim();
    let (declared, encoded) = match data.strip_prefix("data:") {
        Some(rest) => {
            let (header, encoded) = rest
                .split_once(',')
                .ok_or_else(|| ApiError::validation("Malformed image data URI."))?;
            let mime = header
                .strip_suffix(";base64")
                .ok_or_else(|| ApiError::validation("Image data URI must be base64 encoded."))?;
            (Some(mime.to_lowercase()), encoded)
        }
        None => (None, data),
    };

    if encoded.is_empty() {
        return Err(ApiError::validation("Image is empty."));
    }

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|_| ApiError::validation("Image is not valid base64."))?;

    let extension = sniff_extension(&bytes).ok_or_else(|| {
        ApiError::validation("Upload a valid image. The file is not an image or is corrupted.")
    })?;

    if let Some(mime) = declared {
        let expected = IMAGE_FORMATS
            .iter()
            .find(|(known, _)| *known == mime)
            .map(|(_, extension)| *extension);
        if expected != Some(extension) {
            return Err(ApiError::validation("Image content does not match its declared type."));
        }
    }

    Ok(DecodedImage { extension, bytes })
}

fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("jpg"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some("gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("webp"),
        _ => None,
    }
}

/// Where recipe images are written and how they are addressed from outside.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    url: String,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>, url: &str) -> Self {
        let url = match url.ends_with('/') {
            true => url.to_owned(),
            false => format!("{url}/"),
        };

        Self {
            root: root.into(),
            url,
        }
    }

    /// Returns the stored path relative to the media root.
    pub async fn save(&self, image: &DecodedImage) -> Result<String, potion::Error> {
        let name = format!(
            "{RECIPE_IMAGE_DIR}/{}.{}",
            uuid::Uuid::new_v4(),
            image.extension
        );
        let path = self.root.join(&name);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| potion::Error::from(QueryError::new(format!("Failed to create media directory: {e}"))))?;
        }

        tokio::fs::write(&path, &image.bytes)
            .await
            .map_err(|e| potion::Error::from(QueryError::new(format!("Failed to store image: {e}"))))?;

        log::trace!("> Stored image {name}");
        Ok(name)
    }

    /// Best effort; a file that cannot be removed is only logged.
    pub async fn remove(&self, name: &str) {
        if let Err(e) = tokio::fs::remove_file(self.path(name)).await {
            log::warn!("Failed to remove image {name}: {e}");
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(Path::new(name))
    }

    pub fn url(&self, name: &str) -> String {
        format!("{}{}", self.url, name.trim_start_matches('/'))
    }
}
