use crate::grouping::SortKey;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "doppelganger")]
#[command(about = "類似画像（重複画像）検出ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 指紋キャッシュファイル（省略時は設定値またはOSのキャッシュフォルダ）
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// フォルダ内の類似画像を探す
    Find {
        /// 対象フォルダ
        #[arg(required = true)]
        folders: Vec<PathBuf>,

        /// サブフォルダも再帰的にスキャン（省略時は設定値）
        #[arg(short = 'r', long)]
        recursive: bool,

        /// 直下のファイルだけをスキャン
        #[arg(long, conflicts_with = "recursive")]
        no_recursive: bool,

        /// 類似とみなす最大ハミング距離
        #[arg(short, long, conflicts_with = "level")]
        sensitivity: Option<u32>,

        /// 感度プリセット (very-high/high/medium/low/very-low)
        #[arg(short, long)]
        level: Option<Sensitivity>,

        /// グループ内の並び順 (similarity/size/dimensions/path)
        #[arg(long, default_value = "similarity")]
        sort: SortKey,

        /// 結果JSONの出力先
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// キャッシュを使わない（読み込みも保存もしない）
        #[arg(long)]
        no_cache: bool,

        /// 中断を確認する単位（枚数）
        #[arg(long)]
        batch_size: Option<usize>,

        /// ワーカースレッド数
        #[arg(long)]
        threads: Option<usize>,

        /// 各グループの基準画像以外を削除
        #[arg(long, conflicts_with = "move_to")]
        delete: bool,

        /// 各グループの基準画像以外をこのフォルダへ移動
        #[arg(long)]
        move_to: Option<PathBuf>,

        /// 削除・移動で空になったフォルダも消す
        #[arg(long)]
        delete_dirs: bool,
    },

    /// キャッシュ管理
    Cache {
        /// キャッシュを削除
        #[arg(long)]
        clear: bool,

        /// キャッシュ情報を表示
        #[arg(long)]
        info: bool,
    },

    /// 設定を表示/編集
    Config {
        /// 既定の感度を設定
        #[arg(long)]
        set_sensitivity: Option<u32>,

        /// 既定で再帰スキャンするか
        #[arg(long)]
        set_recursive: Option<bool>,

        /// 既定のワーカースレッド数（0 で CPU 数）
        #[arg(long)]
        set_threads: Option<usize>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}

/// 感度プリセット
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Sensitivity {
    /// 距離 0（ほぼ同一のみ）
    VeryHigh,
    /// 距離 5
    #[default]
    High,
    /// 距離 10
    Medium,
    /// 距離 15
    Low,
    /// 距離 20
    VeryLow,
}

impl Sensitivity {
    /// 最大ハミング距離
    pub fn max_distance(&self) -> u32 {
        match self {
            Sensitivity::VeryHigh => 0,
            Sensitivity::High => 5,
            Sensitivity::Medium => 10,
            Sensitivity::Low => 15,
            Sensitivity::VeryLow => 20,
        }
    }
}

impl std::str::FromStr for Sensitivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "very-high" | "vh" => Ok(Sensitivity::VeryHigh),
            "high" | "h" => Ok(Sensitivity::High),
            "medium" | "med" | "m" => Ok(Sensitivity::Medium),
            "low" | "l" => Ok(Sensitivity::Low),
            "very-low" | "vl" => Ok(Sensitivity::VeryLow),
            _ => Err(format!(
                "Unknown level: {}. Use very-high, high, medium, low, or very-low",
                s
            )),
        }
    }
}

impl std::fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sensitivity::VeryHigh => write!(f, "very-high"),
            Sensitivity::High => write!(f, "high"),
            Sensitivity::Medium => write!(f, "medium"),
            Sensitivity::Low => write!(f, "low"),
            Sensitivity::VeryLow => write!(f, "very-low"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitivity_levels() {
        assert_eq!("very-high".parse::<Sensitivity>().unwrap().max_distance(), 0);
        assert_eq!("HIGH".parse::<Sensitivity>().unwrap().max_distance(), 5);
        assert_eq!("medium".parse::<Sensitivity>().unwrap().max_distance(), 10);
        assert_eq!("low".parse::<Sensitivity>().unwrap().max_distance(), 15);
        assert_eq!("very_low".parse::<Sensitivity>().unwrap().max_distance(), 20);
        assert!("extreme".parse::<Sensitivity>().is_err());
    }

    #[test]
    fn test_parse_find_command() {
        let cli = Cli::try_parse_from([
            "doppelganger", "find", "/a", "/b", "-l", "medium", "--sort", "size", "--no-cache",
        ])
        .unwrap();

        match cli.command {
            Commands::Find { folders, level, sort, no_cache, .. } => {
                assert_eq!(folders, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
                assert_eq!(level, Some(Sensitivity::Medium));
                assert_eq!(sort, SortKey::Size);
                assert!(no_cache);
            }
            _ => panic!("expected find"),
        }
    }

    #[test]
    fn test_sensitivity_conflicts_with_level() {
        let result = Cli::try_parse_from(["doppelganger", "find", "/a", "-s", "3", "-l", "low"]);
        assert!(result.is_err());
    }
}
