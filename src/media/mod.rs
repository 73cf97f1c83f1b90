pub mod capture;
pub mod remote;
pub mod upload;

pub use capture::{capture, VideoFrame};
pub use remote::{fetch_limited, FetchError, ImageOrigin};
pub use upload::{object_key, validate, MediaUploader, UploadFile, MAX_UPLOAD_BYTES};
