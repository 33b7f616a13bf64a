//! グループ一覧のJSON出力

use crate::error::Result;
use crate::model::{Fingerprint, Group};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const DEFAULT_FILE_NAME: &str = "duplicates.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub generated_at: String,
    pub sensitivity: u32,
    /// 比較した画像の枚数
    pub image_count: usize,
    pub groups: Vec<ReportGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportGroup {
    pub reference: PathBuf,
    pub images: Vec<ReportImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportImage {
    pub path: PathBuf,
    pub fingerprint: Option<Fingerprint>,
    pub difference: u32,
}

impl Report {
    /// `group()` が返した並び（先頭が基準画像）のグループから作る
    pub fn new(groups: &[Group], sensitivity: u32, image_count: usize) -> Self {
        let groups = groups
            .iter()
            .filter_map(|group| {
                let reference = group.first()?.path.clone();
                let images = group
                    .iter()
                    .map(|img| ReportImage {
                        path: img.path.clone(),
                        fingerprint: img.fingerprint,
                        difference: img.difference,
                    })
                    .collect();
                Some(ReportGroup { reference, images })
            })
            .collect();

        Self {
            generated_at: chrono::Local::now().to_rfc3339(),
            sensitivity,
            image_count,
            groups,
        }
    }

    /// 出力先がフォルダなら `duplicates.json` を作る。書き込んだパスを返す
    pub fn write(&self, output: &Path) -> Result<PathBuf> {
        let path = if output.is_dir() || output.extension().is_none() {
            std::fs::create_dir_all(output)?;
            output.join(DEFAULT_FILE_NAME)
        } else {
            output.to_path_buf()
        };

        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Image;
    use tempfile::tempdir;

    fn sample_groups() -> Vec<Group> {
        let mut b = Image::with_fingerprint("/p/b.jpg", Fingerprint(3));
        b.difference = 2;
        vec![vec![Image::with_fingerprint("/p/a.jpg", Fingerprint(0)), b]]
    }

    #[test]
    fn test_report_reference_is_first_image() {
        let report = Report::new(&sample_groups(), 4, 10);
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].reference, PathBuf::from("/p/a.jpg"));
        assert_eq!(report.groups[0].images[1].difference, 2);
        assert_eq!(report.image_count, 10);
    }

    #[test]
    fn test_report_reference_with_identical_fingerprints() {
        // 全員 difference 0 でも基準画像は先頭
        let groups = crate::grouping::group(
            vec![
                Image::with_fingerprint("/p/z.jpg", Fingerprint(7)),
                Image::with_fingerprint("/p/a.jpg", Fingerprint(7)),
            ],
            0,
        )
        .unwrap();
        let report = Report::new(&groups, 0, 2);
        assert_eq!(report.groups[0].reference, PathBuf::from("/p/z.jpg"));

        let mut sorted = groups.clone();
        crate::grouping::sort_groups(&mut sorted, crate::grouping::SortKey::Path);
        assert_eq!(sorted[0][0].path, PathBuf::from("/p/a.jpg"));
    }

    #[test]
    fn test_report_write_to_folder() {
        let dir = tempdir().unwrap();
        let report = Report::new(&sample_groups(), 4, 2);
        let written = report.write(dir.path()).unwrap();
        assert_eq!(written, dir.path().join("duplicates.json"));

        let content = std::fs::read_to_string(&written).unwrap();
        let loaded: Report = serde_json::from_str(&content).unwrap();
        assert_eq!(loaded.sensitivity, 4);
        assert_eq!(loaded.groups[0].images[1].fingerprint, Some(Fingerprint(3)));
        assert!(content.contains("imageCount"));
    }

    #[test]
    fn test_report_write_to_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("out.json");
        let written = Report::new(&[], 0, 0).write(&target).unwrap();
        assert_eq!(written, target);
        assert!(target.exists());
    }
}
