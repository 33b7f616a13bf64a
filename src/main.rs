use anyhow::Context;
use clap::Parser;
use doppelganger::{cli, config, grouping, hasher, report, scanner};
use cli::{Cli, Commands};
use config::Config;
use hasher::{CancelFlag, HashCache, HashOptions};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load()?;
    if let Some(cache) = &cli.cache {
        config.cache_path = Some(cache.clone());
    }

    match cli.command {
        Commands::Find {
            folders,
            recursive,
            no_recursive,
            sensitivity,
            level,
            sort,
            output,
            no_cache,
            batch_size,
            threads,
            delete,
            move_to,
            delete_dirs,
        } => {
            println!("🔍 doppelganger - 類似画像検出\n");

            let recursive = if recursive {
                true
            } else if no_recursive {
                false
            } else {
                config.recursive
            };
            let sensitivity = sensitivity
                .or(level.map(|l| l.max_distance()))
                .unwrap_or(config.sensitivity);
            let options = HashOptions {
                batch_size: batch_size.unwrap_or(config.batch_size),
                threads: threads.filter(|n| *n > 0).or(config.threads()),
            };

            // 1. 画像スキャン
            println!("[1/4] 画像をスキャン中...");
            let paths: Vec<PathBuf> = scanner::find_images(&folders, recursive)?.into_iter().collect();
            println!("✔ {}枚の画像を検出\n", paths.len());

            // 2. キャッシュ照合
            println!("[2/4] キャッシュを照合中...");
            let cache_path = config.resolved_cache_path()?;
            let mut cache = if no_cache {
                HashCache::default()
            } else {
                HashCache::load(&cache_path).with_context(|| {
                    format!(
                        "キャッシュを読み込めません。`doppelganger cache --clear` で削除してから再実行してください: {}",
                        cache_path.display()
                    )
                })?
            };
            let (cached, uncached) = hasher::partition(&paths, &cache);
            println!("✔ キャッシュ済み: {}枚 / 未計算: {}枚\n", cached.len(), uncached.len());

            // 3. ハッシュ計算
            println!("[3/4] ハッシュを計算中...");
            let cancel = CancelFlag::new();
            {
                let cancel = cancel.clone();
                ctrlc::set_handler(move || cancel.cancel()).context("Ctrl-C ハンドラを登録できません")?;
            }

            let uncached_paths: Vec<PathBuf> = uncached.into_iter().map(|img| img.path).collect();
            let progress = progress_bar(uncached_paths.len() as u64)?;
            let run = hasher::hash_all_with(&uncached_paths, &options, &cancel, Some(&progress));
            progress.finish_and_clear();

            if !no_cache && !run.images.is_empty() {
                let added = hasher::extend(&mut cache, &run.images);
                match cache.save(&cache_path) {
                    Ok(()) => tracing::debug!(added, "cache updated"),
                    // 保存できなくても今回の結果はそのまま使える
                    Err(e) => eprintln!("⚠ {}", e),
                }
            }
            println!("✔ 計算完了: {}枚（読み込めない画像: {}枚）\n", run.images.len(), run.failed.len());
            if cli.verbose {
                for path in &run.failed {
                    println!("  - {}", path.display());
                }
            }

            if run.cancelled || cancel.is_cancelled() {
                println!("⏹ 中断しました（計算済みのハッシュは保存済み）");
                return Ok(());
            }

            // 4. グループ化
            println!("[4/4] 類似画像をグループ化中... (感度: {})", sensitivity);
            let mut images = cached;
            images.extend(run.images);
            images.sort_by(|a, b| a.path.cmp(&b.path));
            let image_count = images.len();
            let mut groups = grouping::group(images, sensitivity)?;
            println!("✔ {}グループを検出\n", groups.len());

            if delete || move_to.is_some() {
                let delete_dirs = delete_dirs || config.delete_dirs;
                apply_file_operations(&mut groups, move_to.as_deref(), delete_dirs, &cancel);
            }

            // 基準画像は並べ替える前の先頭
            let report = output.map(|path| (path, report::Report::new(&groups, sensitivity, image_count)));

            grouping::sort_groups(&mut groups, sort);
            print_groups(&groups);

            if let Some((output, report)) = report {
                let written = report.write(&output)?;
                println!("✔ 結果を保存: {}", written.display());
            }

            println!("\n✅ 完了");
        }

        Commands::Cache { clear, info } => {
            let cache_path = config.resolved_cache_path()?;

            if info || !clear {
                match HashCache::read(&cache_path) {
                    Ok(cache) => {
                        println!("キャッシュ情報:");
                        println!("  パス: {}", cache_path.display());
                        println!("  件数: {}", cache.len());
                        if let Ok(meta) = std::fs::metadata(&cache_path) {
                            println!("  サイズ: {} bytes", meta.len());
                        }
                    }
                    Err(doppelganger::DoppelgangerError::CacheNotFound(_)) => {
                        println!("キャッシュファイルが存在しません: {}", cache_path.display());
                    }
                    Err(e) => println!("キャッシュ読み込みエラー: {}", e),
                }
            }

            if clear {
                match HashCache::clear(&cache_path) {
                    Ok(true) => println!("✔ キャッシュを削除しました: {}", cache_path.display()),
                    Ok(false) => println!("キャッシュファイルが存在しません"),
                    Err(e) => println!("キャッシュ削除エラー: {}", e),
                }
            }
        }

        Commands::Config { set_sensitivity, set_recursive, set_threads, show } => {
            let changed = set_sensitivity.is_some() || set_recursive.is_some() || set_threads.is_some();

            if let Some(sensitivity) = set_sensitivity {
                config.sensitivity = sensitivity;
            }
            if let Some(recursive) = set_recursive {
                config.recursive = recursive;
            }
            if let Some(threads) = set_threads {
                config.threads = threads;
            }
            if changed {
                config.save()?;
                println!("✔ 設定を保存しました: {}", Config::config_path()?.display());
            }

            if show || !changed {
                println!("設定:");
                println!("  感度: {}", config.sensitivity);
                println!("  再帰スキャン: {}", if config.recursive { "有効" } else { "無効" });
                println!("  スレッド数: {}", config.threads().map_or("CPU数".to_string(), |n| n.to_string()));
                println!("  バッチサイズ: {}", config.batch_size);
                println!("  キャッシュ: {}", config.resolved_cache_path()?.display());
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar(len: u64) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(ProgressStyle::with_template("  [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?.progress_chars("=> "));
    Ok(pb)
}

/// 各グループの基準画像（先頭）以外を削除または移動する
///
/// Ctrl-C を受けたら次のファイルへは進まない
fn apply_file_operations(
    groups: &mut [doppelganger::Group],
    move_to: Option<&Path>,
    delete_dirs: bool,
    cancel: &CancelFlag,
) {
    let mut done = 0;
    let mut failed = 0;

    'groups: for group in groups.iter_mut() {
        for img in group.iter_mut().skip(1) {
            if cancel.is_cancelled() {
                println!("⏹ 中断しました");
                break 'groups;
            }
            let original = img.clone();
            let result = match move_to {
                Some(dst) => img.move_to(dst).map(|_| ()),
                None => img.delete(),
            };

            match result {
                Ok(()) => {
                    done += 1;
                    if delete_dirs {
                        if let Err(e) = original.remove_parent_if_empty() {
                            tracing::warn!("{}", e);
                        }
                    }
                }
                Err(e) => {
                    failed += 1;
                    eprintln!("⚠ {}", e);
                }
            }
        }
    }

    let action = if move_to.is_some() { "移動" } else { "削除" };
    println!("✔ {}: {}枚（失敗: {}枚）\n", action, done, failed);
}

fn print_groups(groups: &[doppelganger::Group]) {
    for (i, group) in groups.iter().enumerate() {
        println!("グループ {}:", i + 1);
        for img in group {
            println!("  [{:>3}] {}", img.difference, img.path.display());
        }
    }
}
