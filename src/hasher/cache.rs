//! 指紋キャッシュモジュール
//!
//! 画像パスをキーにして計算済みの指紋を保存し、
//! 2回目以降の実行で同じ画像の再計算をスキップする。

use crate::error::{DoppelgangerError, Result};
use crate::model::{Fingerprint, Image};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const CACHE_FILE_NAME: &str = "image_hashes.json";

/// キャッシュファイルの構造
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashCache {
    /// バージョン（指紋の計算方法が変わったら上げる）
    version: u32,
    /// 画像パス → 指紋
    entries: BTreeMap<String, Fingerprint>,
}

impl HashCache {
    pub const CURRENT_VERSION: u32 = 1;

    /// 既定のキャッシュファイルの場所
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::cache_dir()
            .ok_or_else(|| DoppelgangerError::Config("cache directory not found".into()))?;
        Ok(base.join("doppelganger").join(CACHE_FILE_NAME))
    }

    /// キャッシュを読み込む。ファイルがなければ空のキャッシュ
    pub fn load(path: &Path) -> Result<Self> {
        match Self::read(path) {
            Err(DoppelgangerError::CacheNotFound(_)) => {
                tracing::debug!(path = %path.display(), "no hash cache yet, starting empty");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// キャッシュを読み込む。ファイルがない場合も `CacheNotFound` を返す
    pub fn read(path: &Path) -> Result<Self> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DoppelgangerError::CacheNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let cache: HashCache = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            DoppelgangerError::CacheCorrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        if cache.version != Self::CURRENT_VERSION {
            return Err(DoppelgangerError::CacheCorrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "unsupported cache version {} (expected {})",
                    cache.version,
                    Self::CURRENT_VERSION
                ),
            });
        }

        tracing::debug!(path = %path.display(), entries = cache.len(), "hash cache loaded");
        Ok(cache)
    }

    /// キャッシュを保存する
    ///
    /// 同じフォルダの一時ファイルへ書いてから置き換えるので、
    /// 途中で落ちても古いファイルか新しいファイルのどちらかが残る。
    pub fn save(&self, path: &Path) -> Result<()> {
        let write_err = |source| DoppelgangerError::CacheWrite {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        {
            let file = File::create(&tmp).map_err(write_err)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)
                .map_err(|e| write_err(std::io::Error::other(e)))?;
            writer.flush().map_err(write_err)?;
            writer.get_ref().sync_all().map_err(write_err)?;
        }
        std::fs::rename(&tmp, path).map_err(write_err)?;

        tracing::debug!(path = %path.display(), entries = self.len(), "hash cache saved");
        Ok(())
    }

    /// キャッシュファイルを削除。存在しなければ false
    pub fn clear(path: &Path) -> Result<bool> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// 指紋をルックアップ
    pub fn get(&self, path: &Path) -> Option<Fingerprint> {
        self.entries.get(key(path)?).copied()
    }

    /// キャッシュに追加し、置き換えた古い値を返す
    ///
    /// UTF-8 で表せないパスは登録しない。
    pub fn insert(&mut self, path: &Path, fingerprint: Fingerprint) -> Option<Fingerprint> {
        self.entries.insert(key(path)?.to_owned(), fingerprint)
    }

    /// このパスをキャッシュできるか
    pub fn accepts(path: &Path) -> bool {
        key(path).is_some()
    }

    /// キャッシュ件数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HashCache {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

// 非 UTF-8 のパスを置換文字で潰すと別のファイルと衝突するので、キーにしない
fn key(path: &Path) -> Option<&str> {
    path.to_str()
}

/// キャッシュにある画像とない画像に振り分ける
///
/// - キャッシュにある画像は指紋付きで返す
/// - ない画像は指紋なしで返す（入力順は保つ）
pub fn partition<P: AsRef<Path>>(paths: &[P], cache: &HashCache) -> (Vec<Image>, Vec<Image>) {
    let mut cached = Vec::new();
    let mut uncached = Vec::new();

    for path in paths {
        let path = path.as_ref();
        match cache.get(path) {
            Some(fp) => cached.push(Image::with_fingerprint(path, fp)),
            None => uncached.push(Image::new(path)),
        }
    }

    (cached, uncached)
}

/// 計算できた指紋をキャッシュへ追加し、追加した件数を返す
///
/// 指紋のない画像（ハッシュ計算失敗）は登録しない。
pub fn extend(cache: &mut HashCache, images: &[Image]) -> usize {
    let mut added = 0;
    for img in images {
        if let Some(fp) = img.fingerprint {
            if !HashCache::accepts(&img.path) {
                tracing::debug!(path = %img.path.display(), "path is not valid UTF-8, not cached");
                continue;
            }
            if let Some(old) = cache.insert(&img.path, fp).filter(|old| *old != fp) {
                tracing::warn!(path = %img.path.display(), %old, new = %fp, "cached fingerprint replaced");
            }
            added += 1;
        }
    }
    added
}
