//! Job submission: the image and the declared iteration count.

use std::path::Path;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};

use crate::error::{Result, StreamError};
use crate::session::ExpectedUnits;

/// Image extensions the server accepts.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// A validated job request.
#[derive(Debug, Clone)]
pub struct Submission {
    file_name: String,
    mime: &'static str,
    image: Bytes,
    iterations: ExpectedUnits,
}

impl Submission {
    /// Build a submission from in-memory image bytes.
    pub fn new(file_name: &str, image: impl Into<Bytes>, iterations: u64) -> Result<Self> {
        let mime = mime_for(file_name).ok_or_else(|| not_allowed(file_name))?;
        let image = image.into();
        if image.is_empty() {
            return Err(StreamError::InvalidSubmission(format!(
                "{file_name} is empty"
            )));
        }

        Ok(Submission {
            file_name: file_name.to_string(),
            mime,
            image,
            iterations: ExpectedUnits::new(iterations)?,
        })
    }

    /// Submission for a replayed capture. Nothing is uploaded; only the
    /// iteration count matters.
    pub fn replay(iterations: u64) -> Result<Self> {
        Ok(Submission {
            file_name: "replay".to_string(),
            mime: "application/octet-stream",
            image: Bytes::new(),
            iterations: ExpectedUnits::new(iterations)?,
        })
    }

    /// Read an image file from disk.
    pub async fn from_path(path: &Path, iterations: u64) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                StreamError::InvalidSubmission(format!("{} has no file name", path.display()))
            })?
            .to_string();
        // check the extension before reading a possibly large file
        if !allowed_file(&file_name) {
            return Err(not_allowed(&file_name));
        }
        let image = tokio::fs::read(path).await?;
        Self::new(&file_name, image, iterations)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn image(&self) -> &Bytes {
        &self.image
    }

    pub fn iterations(&self) -> ExpectedUnits {
        self.iterations
    }

    /// Multipart body: `image` file part plus `iterations` text field.
    pub fn to_form(&self) -> Result<Form> {
        let part = Part::bytes(self.image.to_vec())
            .file_name(self.file_name.clone())
            .mime_str(self.mime)?;
        Ok(Form::new()
            .part("image", part)
            .text("iterations", self.iterations.to_string()))
    }
}

/// Whether `file_name` has an allowed image extension (case-insensitive).
pub fn allowed_file(file_name: &str) -> bool {
    mime_for(file_name).is_some()
}

fn not_allowed(file_name: &str) -> StreamError {
    StreamError::InvalidSubmission(format!(
        "{file_name} is not an allowed image type (expected one of: {})",
        ALLOWED_EXTENSIONS.join(", ")
    ))
}

fn mime_for(file_name: &str) -> Option<&'static str> {
    let (_, extension) = file_name.rsplit_once('.')?;
    match extension.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}
