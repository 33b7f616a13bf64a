//! 差分ハッシュ（dHash）の計算
//!
//! グレースケール化して 9x9 に縮小し、隣接画素の明暗差をビット化する。
//! 行方向の64ビットを上位、列方向の64ビットを下位に並べた128ビット値が指紋になる。

use crate::error::{DoppelgangerError, Result};
use crate::model::Fingerprint;
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, ImageFormat, ImageReader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const HASH_SIZE: u32 = 8;

/// 画像ファイルを開いて指紋を計算
pub fn hash_image(path: &Path) -> Result<Fingerprint> {
    let img = open_image(path)?;
    Ok(dhash(&img))
}

/// 拡張子ではなく中身から形式を判定してデコードする
fn open_image(path: &Path) -> Result<DynamicImage> {
    let decode_err = |source| DoppelgangerError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| decode_err(image::ImageError::IoError(e)))?;
    reader.no_limits();
    let format = reader.format();

    match reader.decode() {
        Ok(img) => Ok(img),
        Err(e) if format == Some(ImageFormat::Png) => match decode_truncated_png(path) {
            Some(img) => Ok(img),
            None => Err(decode_err(e)),
        },
        Err(e) => Err(decode_err(e)),
    }
}

/// 途中で切れた PNG を読める行までデコードし、残りの行を黒で埋める
///
/// 1行も読めない場合とインターレース画像は `None`。
fn decode_truncated_png(path: &Path) -> Option<DynamicImage> {
    let file = File::open(path).ok()?;
    let mut decoder = png::Decoder::new_with_limits(BufReader::new(file), png::Limits { bytes: usize::MAX });
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().ok()?;
    if reader.info().interlaced {
        return None;
    }

    let (width, height) = (reader.info().width, reader.info().height);
    let (color, _) = reader.output_color_type();
    let stride = width as usize * color.samples();
    let mut buf = vec![0u8; stride * height as usize];

    let mut rows = 0;
    while rows < height as usize {
        match reader.next_row() {
            Ok(Some(row)) => {
                let data = row.data();
                let len = data.len().min(stride);
                buf[rows * stride..rows * stride + len].copy_from_slice(&data[..len]);
                rows += 1;
            }
            Ok(None) | Err(_) => break,
        }
    }
    if rows == 0 {
        return None;
    }
    tracing::debug!(path = %path.display(), rows, height, "truncated PNG, missing rows padded");

    match color {
        png::ColorType::Grayscale => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLuma8),
        png::ColorType::GrayscaleAlpha => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8),
        png::ColorType::Rgb => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgb8),
        png::ColorType::Rgba => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgba8),
        png::ColorType::Indexed => None,
    }
}

/// デコード済み画像の指紋
pub fn dhash(img: &DynamicImage) -> Fingerprint {
    let width = HASH_SIZE + 1;
    let gray = img.resize_exact(width, width, FilterType::Lanczos3).to_luma8();

    let mut row_hash: u128 = 0;
    let mut col_hash: u128 = 0;
    for y in 0..HASH_SIZE {
        for x in 0..HASH_SIZE {
            let here = gray.get_pixel(x, y)[0];
            let right = gray.get_pixel(x + 1, y)[0];
            let below = gray.get_pixel(x, y + 1)[0];
            row_hash = (row_hash << 1) | u128::from(here < right);
            col_hash = (col_hash << 1) | u128::from(here < below);
        }
    }

    Fingerprint((row_hash << (HASH_SIZE * HASH_SIZE)) | col_hash)
}
