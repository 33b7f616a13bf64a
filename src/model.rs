//! 画像レコードと指紋の型定義

use crate::error::{DoppelgangerError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// 128ビットの知覚ハッシュ（行勾配64ビット + 列勾配64ビット）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u128);

impl Fingerprint {
    /// 異なるビットの数
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(format!("fingerprint must be 32 hex digits, got {:?}", s));
        }
        u128::from_str_radix(s, 16)
            .map(Fingerprint)
            .map_err(|e| format!("invalid fingerprint {:?}: {}", s, e))
    }
}

// キャッシュファイルでは固定長の16進文字列として保存する
impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// ファイルサイズの単位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeFormat {
    Bytes,
    #[default]
    KiloBytes,
    MegaBytes,
}

/// 重複判定の対象となる画像1枚
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub path: PathBuf,
    pub fingerprint: Option<Fingerprint>,
    /// グループの基準画像からの距離（基準画像自身は0）
    pub difference: u32,
    size: Option<u64>,
    dims: Option<(u32, u32)>,
}

impl Image {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fingerprint: None,
            difference: 0,
            size: None,
            dims: None,
        }
    }

    pub fn with_fingerprint(path: impl Into<PathBuf>, fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint: Some(fingerprint),
            ..Self::new(path)
        }
    }

    pub fn is_hashed(&self) -> bool {
        self.fingerprint.is_some()
    }

    /// ファイルサイズ（小数点以下1桁に丸める）
    ///
    /// 初回のみディスクを参照し、成功した値だけを保持する。
    pub fn filesize(&mut self, format: SizeFormat) -> Result<f64> {
        let bytes = match self.size {
            Some(bytes) => bytes,
            None => {
                let bytes = std::fs::metadata(&self.path)
                    .map_err(|source| DoppelgangerError::FileOperation {
                        path: self.path.clone(),
                        source,
                    })?
                    .len();
                self.size = Some(bytes);
                bytes
            }
        };

        let value = match format {
            SizeFormat::Bytes => return Ok(bytes as f64),
            SizeFormat::KiloBytes => bytes as f64 / 1024.0,
            SizeFormat::MegaBytes => bytes as f64 / (1024.0 * 1024.0),
        };
        Ok((value * 10.0).round() / 10.0)
    }

    /// 画像の幅と高さ（ヘッダのみ読む）
    pub fn dimensions(&mut self) -> Result<(u32, u32)> {
        if let Some(dims) = self.dims {
            return Ok(dims);
        }
        let dims = image::image_dimensions(&self.path).map_err(|source| DoppelgangerError::Decode {
            path: self.path.clone(),
            source,
        })?;
        self.dims = Some(dims);
        Ok(dims)
    }

    /// ディスクから削除
    pub fn delete(&self) -> Result<()> {
        std::fs::remove_file(&self.path).map_err(|source| DoppelgangerError::FileOperation {
            path: self.path.clone(),
            source,
        })
    }

    /// 別フォルダへ移動し、新しいパスを返す
    pub fn move_to(&mut self, dst: &Path) -> Result<PathBuf> {
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| DoppelgangerError::Config(format!("not a file path: {}", self.path.display())))?;
        let new_path = dst.join(file_name);
        if new_path.exists() {
            return Err(DoppelgangerError::FileExists(new_path));
        }

        std::fs::rename(&self.path, &new_path).map_err(|source| DoppelgangerError::FileOperation {
            path: self.path.clone(),
            source,
        })?;
        self.path = new_path.clone();
        Ok(new_path)
    }

    /// 同じフォルダ内で名前を変更（既存ファイルは上書きしない）
    pub fn rename(&mut self, name: &str) -> Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new(""));
        let new_path = parent.join(name);
        if new_path.exists() {
            return Err(DoppelgangerError::FileExists(new_path));
        }

        std::fs::rename(&self.path, &new_path).map_err(|source| DoppelgangerError::FileOperation {
            path: self.path.clone(),
            source,
        })?;
        self.path = new_path;
        Ok(())
    }

    /// 親フォルダが空なら削除する。削除した場合は true
    pub fn remove_parent_if_empty(&self) -> Result<bool> {
        let Some(parent) = self.path.parent() else {
            return Ok(false);
        };
        let mut entries = std::fs::read_dir(parent)?;
        if entries.next().is_some() {
            return Ok(false);
        }
        std::fs::remove_dir(parent).map_err(|source| DoppelgangerError::FileOperation {
            path: parent.to_path_buf(),
            source,
        })?;
        Ok(true)
    }
}

/// 類似画像のグループ（先頭が基準画像）
pub type Group = Vec<Image>;
