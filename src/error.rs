use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DoppelgangerError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// 画像のデコード失敗（1枚単位、処理は継続）
    #[error("Cannot decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Hash cache not found: {0}")]
    CacheNotFound(PathBuf),

    #[error("Hash cache is corrupted ({path}): {reason}. Delete or back up the file and run again")]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("Cannot write hash cache {path}: {source}")]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// グルーピング対象に指紋のない画像が含まれている
    #[error("Image has no fingerprint and cannot be grouped: {0}")]
    InvalidFingerprint(PathBuf),

    #[error("File operation failed on {path}: {source}")]
    FileOperation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DoppelgangerError>;
