use crate::error::{DoppelgangerError, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// フォルダ内の画像パスを集める
///
/// 存在しないフォルダが1つでもあれば、走査を始める前にエラーを返す。
/// 結果はパス順に並んだ集合（重複なし）。
pub fn find_images<P: AsRef<Path>>(folders: &[P], recursive: bool) -> Result<BTreeSet<PathBuf>> {
    for folder in folders {
        let folder = folder.as_ref();
        if !folder.exists() {
            return Err(DoppelgangerError::FolderNotFound(folder.display().to_string()));
        }
    }

    let mut paths = BTreeSet::new();
    for folder in folders {
        paths.extend(search(folder.as_ref(), recursive));
    }

    tracing::debug!(count = paths.len(), "images found");
    Ok(paths)
}

fn search(folder: &Path, recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(folder)
    } else {
        WalkDir::new(folder).max_depth(1)
    };

    walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_image_path(p))
        .map(|p| std::path::absolute(&p).unwrap_or(p))
        .collect()
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn test_is_image_path() {
        assert!(is_image_path(Path::new("a.jpg")));
        assert!(is_image_path(Path::new("a.JPG")));
        assert!(is_image_path(Path::new("a.jpeg")));
        assert!(is_image_path(Path::new("a.png")));
        assert!(is_image_path(Path::new("a.bmp")));
        assert!(!is_image_path(Path::new("a.txt")));
        assert!(!is_image_path(Path::new("a.gif")));
        assert!(!is_image_path(Path::new("png")));
    }

    #[test]
    fn test_find_images_folder_not_found() {
        let result = find_images(&[Path::new("/nonexistent/folder")], true);
        assert!(matches!(result, Err(DoppelgangerError::FolderNotFound(_))));
    }

    #[test]
    fn test_find_images_empty_folder_list() {
        let folders: [&Path; 0] = [];
        assert!(find_images(&folders, true).unwrap().is_empty());
    }

    #[test]
    fn test_find_images_recursive_and_flat() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir_all(&sub).unwrap();

        File::create(dir.path().join("a.jpg")).unwrap();
        File::create(dir.path().join("b.PNG")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();
        File::create(sub.join("c.bmp")).unwrap();
        // 拡張子が画像でもフォルダは対象外
        fs::create_dir_all(dir.path().join("folder.jpg")).unwrap();

        let flat = find_images(&[dir.path()], false).unwrap();
        assert_eq!(flat.len(), 2);

        let all = find_images(&[dir.path()], true).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|p| p.is_absolute()));
        assert!(all.iter().any(|p| p.ends_with("sub/c.bmp")));
    }

    #[test]
    fn test_find_images_overlapping_folders_deduplicated() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir_all(&sub).unwrap();
        File::create(sub.join("x.jpeg")).unwrap();

        let paths = find_images(&[dir.path(), sub.as_path()], true).unwrap();
        assert_eq!(paths.len(), 1);
    }
}
