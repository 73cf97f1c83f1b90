use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use rand::Rng;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{error::AppError, storage::StorageClient};

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const KEY_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const KEY_SUFFIX_LEN: usize = 10;

/// A file picked, dropped, or captured by the client.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    /// Parses a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(name_stem: &str, data_url: &str) -> Result<Self, AppError> {
        let invalid = || AppError::Validation("invalid data URL".into());
        let rest = data_url.strip_prefix("data:").ok_or_else(invalid)?;
        let (meta, payload) = rest.split_once(',').ok_or_else(invalid)?;
        let content_type = meta.strip_suffix(";base64").ok_or_else(invalid)?;
        let bytes = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;
        let ext = ext_from_mime(content_type).unwrap_or("png");
        Ok(Self {
            file_name: format!("{}.{}", name_stem, ext),
            content_type: content_type.to_string(),
            bytes: Bytes::from(bytes),
        })
    }
}

/// The only two rules: an `image/*` type and at most 10 MiB.
pub fn validate(file: &UploadFile) -> Result<(), AppError> {
    if !file.content_type.starts_with("image/") {
        return Err(AppError::Validation("file must be an image".into()));
    }
    if file.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::Validation(
            "file must not be larger than 10MB".into(),
        ));
    }
    Ok(())
}

/// `{unix_millis}-{random base36}.{ext}`, the extension taken from the original name.
pub fn object_key(file: &UploadFile, now: OffsetDateTime) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..KEY_SUFFIX_LEN)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}.{}", millis, suffix, extension(file))
}

fn extension(file: &UploadFile) -> String {
    file.file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .or_else(|| ext_from_mime(&file.content_type).map(str::to_string))
        .unwrap_or_else(|| "bin".into())
}

pub(crate) fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Uploads images to object storage, one at a time per instance.
pub struct MediaUploader {
    storage: Arc<dyn StorageClient>,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl MediaUploader {
    pub fn new(storage: Arc<dyn StorageClient>) -> Self {
        Self {
            storage,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_uploading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Validates, stores under a fresh key, and returns the durable public URL.
    pub async fn upload(&self, file: UploadFile) -> Result<String, AppError> {
        validate(&file)?;
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(AppError::Conflict("an upload is already in progress".into()));
        }
        let _guard = InFlight(&self.in_flight);

        let key = object_key(&file, OffsetDateTime::now_utc());
        debug!(%key, size = file.bytes.len(), "uploading image");
        let path = self
            .storage
            .put_object(&key, file.bytes, &file.content_type)
            .await
            .map_err(|e| AppError::Upload(format!("{:#}", e)))?;
        let url = self.storage.public_url(&path);
        info!(%key, "image uploaded");
        Ok(url)
    }
}
