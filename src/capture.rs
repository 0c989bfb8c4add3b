// 画面截图导出

use crate::core::{FrameData, Result};
use image::ImageFormat;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

/// 在 `dir` 下生成不冲突的文件名：`base.ext`、`base_1.ext`、`base_2.ext` ...
pub fn unique_path(dir: &Path, base: &str, ext: &str) -> PathBuf {
    let mut path = dir.join(format!("{}.{}", base, ext));
    let mut counter = 1u32;
    while path.exists() {
        path = dir.join(format!("{}_{}.{}", base, counter, ext));
        counter += 1;
    }
    path
}

/// 把帧画面保存为 PNG，返回实际写入的路径（目录不存在时创建）
pub fn save_frame_png(frame: &FrameData, dir: &Path, base: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = unique_path(dir, base, "png");
    frame.image.save_with_format(&path, ImageFormat::Png)?;
    info!(
        "📸 已保存截图 {}x{}: {}",
        frame.width(),
        frame.height(),
        path.display()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid_frame(w: u32, h: u32) -> FrameData {
        FrameData {
            image: RgbImage::from_pixel(w, h, Rgb([200, 30, 30])),
            audio: Vec::new(),
            pts: 0,
        }
    }

    #[test]
    fn test_unique_path_counts_up() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(unique_path(dir.path(), "shot", "png"), dir.path().join("shot.png"));

        fs::write(dir.path().join("shot.png"), b"x").unwrap();
        assert_eq!(unique_path(dir.path(), "shot", "png"), dir.path().join("shot_1.png"));

        fs::write(dir.path().join("shot_1.png"), b"x").unwrap();
        assert_eq!(unique_path(dir.path(), "shot", "png"), dir.path().join("shot_2.png"));
    }

    #[test]
    fn test_save_frame_png_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("captures");
        let frame = solid_frame(8, 6);

        let first = save_frame_png(&frame, &out, "frame").unwrap();
        let second = save_frame_png(&frame, &out, "frame").unwrap();
        assert_ne!(first, second);
        assert_eq!(second.file_name().unwrap(), "frame_1.png");

        let decoded = image::open(&first).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert_eq!(decoded.get_pixel(3, 3), &Rgb([200, 30, 30]));
    }
}
