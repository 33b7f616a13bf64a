pub mod cache;
pub mod dhash;

pub use cache::{extend, partition, HashCache};
pub use dhash::{dhash, hash_image};

use crate::model::Image;
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 中断要求フラグ（複数スレッドから共有）
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// ハッシュ計算の設定
#[derive(Debug, Clone)]
pub struct HashOptions {
    /// 中断を確認する単位（枚数）
    pub batch_size: usize,
    /// ワーカースレッド数（None なら CPU 数）
    pub threads: Option<usize>,
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            batch_size: 256,
            threads: None,
        }
    }
}

/// ハッシュ計算の結果
#[derive(Debug, Default)]
pub struct HashRun {
    /// 指紋を計算できた画像（入力順）
    pub images: Vec<Image>,
    /// デコードできずに除外した画像
    pub failed: Vec<PathBuf>,
    /// 中断されたか（未処理の画像は images にも failed にも含まれない）
    pub cancelled: bool,
}

/// すべての画像の指紋を並列に計算する
///
/// 失敗した画像は結果に含めない。
pub fn hash_all<P: AsRef<Path> + Sync>(paths: &[P]) -> Vec<Image> {
    hash_all_with(paths, &HashOptions::default(), &CancelFlag::new(), None).images
}

/// バッチごとに中断を確認しながら指紋を計算する
///
/// 実行中のバッチは最後まで処理し、それまでの結果を返すので
/// 中断後もキャッシュへ保存できる。
pub fn hash_all_with<P: AsRef<Path> + Sync>(
    paths: &[P],
    options: &HashOptions,
    cancel: &CancelFlag,
    progress: Option<&ProgressBar>,
) -> HashRun {
    let pool = match build_pool(options.threads) {
        Ok(pool) => Some(pool),
        Err(e) => {
            tracing::warn!("cannot build worker pool, using the global one: {}", e);
            None
        }
    };

    let mut run = HashRun::default();
    for batch in paths.chunks(options.batch_size.max(1)) {
        if cancel.is_cancelled() {
            break;
        }

        let results = match &pool {
            Some(pool) => pool.install(|| hash_batch(batch, cancel, progress)),
            None => hash_batch(batch, cancel, progress),
        };

        for img in results {
            if img.is_hashed() {
                run.images.push(img);
            } else {
                run.failed.push(img.path);
            }
        }
    }

    // バッチの途中で中断された場合もここで拾う
    run.cancelled = cancel.is_cancelled();
    if run.cancelled {
        tracing::info!(done = run.images.len() + run.failed.len(), total = paths.len(), "hashing cancelled");
    } else {
        tracing::info!(hashed = run.images.len(), failed = run.failed.len(), "hashing finished");
    }
    run
}

fn build_pool(threads: Option<usize>) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("dhash-{}", i));
    if let Some(n) = threads.filter(|n| *n > 0) {
        builder = builder.num_threads(n);
    }
    builder.build()
}

// 各ワーカーは新しい Image を返すだけで共有状態を持たない。
// 中断後は未着手の画像を飛ばし、images にも failed にも入れない
fn hash_batch<P: AsRef<Path> + Sync>(
    batch: &[P],
    cancel: &CancelFlag,
    progress: Option<&ProgressBar>,
) -> Vec<Image> {
    batch
        .par_iter()
        .filter_map(|path| {
            if cancel.is_cancelled() {
                return None;
            }

            let path = path.as_ref();
            let mut img = Image::new(path);
            match hash_image(path) {
                Ok(fp) => img.fingerprint = Some(fp),
                Err(e) => tracing::warn!("{}", e),
            }
            if let Some(pb) = progress {
                pb.inc(1);
            }
            Some(img)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn write_gradient(path: &Path, size: u32) {
        RgbImage::from_fn(size, size, |x, y| {
            let v = ((x + y) * 255 / (2 * size)) as u8;
            Rgb([v, v, v])
        })
        .save(path)
        .unwrap();
    }

    #[test]
    fn test_hash_all_drops_failures_and_keeps_order() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.png");
        let bad = dir.path().join("bad.png");
        let c = dir.path().join("c.png");
        write_gradient(&a, 32);
        std::fs::write(&bad, b"garbage").unwrap();
        write_gradient(&c, 64);

        let images = hash_all(&[a.clone(), bad, c.clone()]);
        let paths: Vec<_> = images.iter().map(|i| i.path.clone()).collect();
        assert_eq!(paths, vec![a, c]);
        assert!(images.iter().all(|i| i.is_hashed()));
    }

    #[test]
    fn test_hash_all_with_reports_failures() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.png");
        let bad = dir.path().join("bad.jpg");
        write_gradient(&good, 16);
        std::fs::write(&bad, b"\xff\xd8\xff truncated").unwrap();

        let run = hash_all_with(&[good, bad.clone()], &HashOptions::default(), &CancelFlag::new(), None);
        assert_eq!(run.images.len(), 1);
        assert_eq!(run.failed, vec![bad]);
        assert!(!run.cancelled);
    }

    #[test]
    fn test_cancel_before_start_does_no_work() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.png");
        write_gradient(&a, 16);

        let cancel = CancelFlag::new();
        cancel.cancel();
        let run = hash_all_with(&[a], &HashOptions::default(), &cancel, None);

        assert!(run.cancelled);
        assert!(run.images.is_empty());
        assert!(run.failed.is_empty());
    }

    #[test]
    fn test_batch_skips_images_once_cancelled() {
        let dir = tempdir().unwrap();
        let paths: Vec<_> = (0..3)
            .map(|i| {
                let p = dir.path().join(format!("{}.png", i));
                write_gradient(&p, 16);
                p
            })
            .collect();

        let cancel = CancelFlag::new();
        let progress = ProgressBar::hidden();
        assert_eq!(hash_batch(&paths, &cancel, Some(&progress)).len(), 3);

        cancel.cancel();
        assert!(hash_batch(&paths, &cancel, Some(&progress)).is_empty());
        assert_eq!(progress.position(), 3);
    }

    #[test]
    fn test_cancel_during_single_batch() {
        let dir = tempdir().unwrap();
        let paths: Vec<_> = (0..400)
            .map(|i| {
                let p = dir.path().join(format!("{:03}.png", i));
                write_gradient(&p, 96);
                p
            })
            .collect();

        // 全件が1バッチに入るので、バッチ間のチェックでは止まらない
        let options = HashOptions {
            batch_size: 1000,
            threads: Some(1),
        };
        let cancel = CancelFlag::new();
        let progress = ProgressBar::hidden();

        let run = std::thread::scope(|s| {
            s.spawn(|| {
                while progress.position() < 1 {
                    std::thread::yield_now();
                }
                cancel.cancel();
            });
            hash_all_with(&paths, &options, &cancel, Some(&progress))
        });

        assert!(run.cancelled);
        assert!(run.images.len() < paths.len());
        assert!(run.failed.is_empty());
        assert_eq!(progress.position() as usize, run.images.len());
    }

    #[test]
    fn test_single_thread_pool_matches_default() {
        let dir = tempdir().unwrap();
        let paths: Vec<_> = (0..5)
            .map(|i| {
                let p = dir.path().join(format!("{}.png", i));
                write_gradient(&p, 16 + i * 8);
                p
            })
            .collect();

        let options = HashOptions {
            batch_size: 2,
            threads: Some(1),
        };
        let run = hash_all_with(&paths, &options, &CancelFlag::new(), None);
        assert_eq!(run.images, hash_all(&paths));
    }
}
