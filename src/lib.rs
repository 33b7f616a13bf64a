//! Doppelgänger
//!
//! 知覚ハッシュ（dHash）で類似画像を探すライブラリ。
//! フォルダ走査 → キャッシュ照合 → 並列ハッシュ計算 → BK木によるグループ化。

pub mod cli;
pub mod config;
pub mod error;
pub mod grouping;
pub mod hasher;
pub mod model;
pub mod report;
pub mod scanner;

pub use error::{DoppelgangerError, Result};
pub use grouping::{group, sort_groups, SortKey};
pub use hasher::{hash_all, hash_all_with, CancelFlag, HashCache, HashOptions, HashRun};
pub use model::{Fingerprint, Group, Image, SizeFormat};
pub use scanner::find_images;
