use crate::error::{DoppelgangerError, Result};
use crate::hasher::HashCache;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 類似とみなす最大ハミング距離
    pub sensitivity: u32,
    pub recursive: bool,
    /// ワーカースレッド数（0 なら CPU 数）
    pub threads: usize,
    pub batch_size: usize,
    /// 指紋キャッシュの場所（未設定なら OS のキャッシュフォルダ）
    pub cache_path: Option<PathBuf>,
    /// 移動・削除後に空になったフォルダも消す
    pub delete_dirs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sensitivity: 5,
            recursive: true,
            threads: 0,
            batch_size: 256,
            cache_path: None,
            delete_dirs: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| DoppelgangerError::Config("home directory not found".into()))?;
        Ok(home.join(".config").join("doppelganger").join("config.json"))
    }

    /// 実際に使うキャッシュファイルのパス
    pub fn resolved_cache_path(&self) -> Result<PathBuf> {
        match &self.cache_path {
            Some(path) => Ok(path.clone()),
            None => HashCache::default_path(),
        }
    }

    pub fn threads(&self) -> Option<usize> {
        (self.threads > 0).then_some(self.threads)
    }
}
