use std::path::Path;

use shared::{domain::ImageId, error::ValidationError};

use crate::error::SelectionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub id: ImageId,
    pub name: String,
    /// Original size in bytes.
    pub size: u64,
    pub mime_type: String,
    pub payload: Vec<u8>,
}

impl SelectedImage {
    pub fn new(name: impl Into<String>, payload: Vec<u8>) -> Self {
        let name = name.into();
        let mime_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            id: ImageId::random(),
            size: payload.len() as u64,
            name,
            mime_type,
            payload,
        }
    }

    /// Reads an image file from disk. Files whose extension does not map to
    /// an `image/*` type are rejected.
    pub async fn from_path(path: &Path) -> Result<Self, SelectionError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let is_image = mime_guess::from_path(path)
            .iter()
            .any(|mime| mime.type_() == mime_guess::mime::IMAGE);
        if !is_image {
            return Err(ValidationError::NotAnImage { name }.into());
        }

        let payload = tokio::fs::read(path)
            .await
            .map_err(|source| SelectionError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(name, payload))
    }
}

/// Images the user has picked, in pick order.
#[derive(Debug, Clone, Default)]
pub struct ImageSelection {
    images: Vec<SelectedImage>,
}

impl ImageSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an image, issuing a fresh id if the given one is already taken.
    pub fn add(&mut self, mut image: SelectedImage) -> ImageId {
        while self.contains(image.id) {
            image.id = ImageId::random();
        }
        let id = image.id;
        self.images.push(image);
        id
    }

    pub fn extend(&mut self, images: impl IntoIterator<Item = SelectedImage>) -> Vec<ImageId> {
        images.into_iter().map(|image| self.add(image)).collect()
    }

    pub fn remove(&mut self, id: ImageId) -> Option<SelectedImage> {
        let index = self.images.iter().position(|image| image.id == id)?;
        Some(self.images.remove(index))
    }

    pub fn reset(&mut self) {
        self.images.clear();
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.images.iter().any(|image| image.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SelectedImage> {
        self.images.iter()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.images.iter().map(|image| image.size).sum()
    }
}
