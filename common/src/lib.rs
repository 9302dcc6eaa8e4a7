pub mod buffer2;
pub mod cancel;
pub mod file_format;
pub mod log_setup;

pub use buffer2::Buffer2;
pub use cancel::CancelToken;
pub use file_format::{deserialize, serialize, FileFormat, SerdeFormatError, SerdeFormatResult};
