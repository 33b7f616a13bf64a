//! 類似画像のグループ化
//!
//! 入力順に画像を走査し、まだどのグループにも属していない画像を基準として
//! 半径 `sensitivity` 以内の未所属画像をまとめる。推移的には結合しないので、
//! A~B かつ B~C でも A と C の距離が閾値を超えていれば同じグループにはならない。

pub mod bktree;

pub use bktree::{BkTree, Hamming, Metric};

use crate::error::{DoppelgangerError, Result};
use crate::model::{Fingerprint, Group, Image, SizeFormat};
use std::cmp::Reverse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    fingerprint: Fingerprint,
    index: usize,
}

impl Metric<Entry> for Hamming {
    fn distance(&self, a: &Entry, b: &Entry) -> u32 {
        a.fingerprint.distance(&b.fingerprint)
    }
}

/// 画像を類似グループに分ける
///
/// - 指紋付きの画像が2枚未満なら空
/// - 指紋のない画像が混ざっていれば、グループを1つも作らずにエラー
/// - 各グループの先頭は基準画像で、他の画像の `difference` は基準画像からの距離
pub fn group(images: Vec<Image>, sensitivity: u32) -> Result<Vec<Group>> {
    if images.len() < 2 {
        return Ok(Vec::new());
    }

    let entries = images
        .iter()
        .enumerate()
        .map(|(index, img)| {
            img.fingerprint
                .map(|fingerprint| Entry { fingerprint, index })
                .ok_or_else(|| DoppelgangerError::InvalidFingerprint(img.path.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut tree = BkTree::new(Hamming);
    tree.extend(entries.iter().copied());

    let mut checked = vec![false; images.len()];
    let mut members: Vec<Vec<(usize, u32)>> = Vec::new();

    for entry in &entries {
        if checked[entry.index] {
            continue;
        }

        let closest = tree.find(entry, sensitivity);
        // 1件だけなら自分自身
        if closest.len() == 1 {
            continue;
        }

        let mut new_group = Vec::new();
        for (distance, candidate) in closest {
            if !checked[candidate.index] {
                checked[candidate.index] = true;
                new_group.push((candidate.index, distance));
            }
        }
        if new_group.len() < 2 {
            tracing::debug!(
                path = %images[entry.index].path.display(),
                "group left with a single image, its neighbours are already grouped"
            );
        }
        members.push(new_group);
    }

    let mut slots: Vec<Option<Image>> = images.into_iter().map(Some).collect();
    let groups: Vec<Group> = members
        .into_iter()
        .map(|group| {
            group
                .into_iter()
                .filter_map(|(index, distance)| {
                    slots[index].take().map(|mut img| {
                        img.difference = distance;
                        img
                    })
                })
                .collect()
        })
        .collect();

    tracing::info!(groups = groups.len(), sensitivity, "grouping finished");
    Ok(groups)
}

/// グループ内の並び順
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortKey {
    /// 基準画像からの距離が小さい順（デフォルト）
    #[default]
    Similarity,
    /// ファイルサイズが大きい順
    Size,
    /// 画素数が多い順
    Dimensions,
    /// パスの辞書順
    Path,
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "similarity" | "difference" => Ok(SortKey::Similarity),
            "size" => Ok(SortKey::Size),
            "dimensions" | "dims" => Ok(SortKey::Dimensions),
            "path" => Ok(SortKey::Path),
            _ => Err(format!(
                "Unknown sort key: {}. Use similarity, size, dimensions, or path",
                s
            )),
        }
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortKey::Similarity => write!(f, "similarity"),
            SortKey::Size => write!(f, "size"),
            SortKey::Dimensions => write!(f, "dimensions"),
            SortKey::Path => write!(f, "path"),
        }
    }
}

/// 各グループの中身を並べ替える
///
/// サイズや寸法を取得できなかった画像は末尾に回す。
pub fn sort_groups(groups: &mut [Group], key: SortKey) {
    for group in groups.iter_mut() {
        match key {
            SortKey::Similarity => group.sort_by_key(|img| img.difference),
            SortKey::Path => group.sort_by(|a, b| a.path.cmp(&b.path)),
            SortKey::Size => sort_by_metadata(group, |img| {
                img.filesize(SizeFormat::Bytes).ok().map(|bytes| bytes as u64)
            }),
            SortKey::Dimensions => sort_by_metadata(group, |img| {
                img.dimensions().ok().map(|(w, h)| u64::from(w) * u64::from(h))
            }),
        }
    }
}

// 大きい順。None は Some より小さいので自然に末尾へ行く
fn sort_by_metadata<F>(group: &mut Group, mut value: F)
where
    F: FnMut(&mut Image) -> Option<u64>,
{
    let mut keyed: Vec<(Option<u64>, Image)> = group
        .drain(..)
        .map(|mut img| (value(&mut img), img))
        .collect();
    keyed.sort_by_key(|(v, _)| Reverse(*v));
    group.extend(keyed.into_iter().map(|(_, img)| img));
}
