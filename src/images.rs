//! Decoding, resizing and storing uploaded images.
//!
//! Image work is CPU bound and runs on the blocking pool.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::debug;

use crate::error::{AppError, AppResult};

pub const PROFILE_IMAGE_DIR: &str = "profile-images";
pub const POST_IMAGE_DIR: &str = "post-images";

/// Largest side of a stored profile image.
const PROFILE_IMAGE_MAX: u32 = 400;

const PROFILE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const POST_EXTENSIONS: &[&str] = &["jpg", "jpe", "jpeg", "png", "gif", "bmp"];

/// Lower-cased extension of `filename` when it is in `allowed`.
fn allowed_extension(filename: &str, allowed: &[&str]) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    allowed.contains(&ext.as_str()).then_some(ext)
}

pub fn is_allowed_profile_image(filename: &str) -> bool {
    allowed_extension(filename, PROFILE_EXTENSIONS).is_some()
}

pub fn is_allowed_post_image(filename: &str) -> bool {
    allowed_extension(filename, POST_EXTENSIONS).is_some()
}

fn format_for(ext: &str) -> Option<ImageFormat> {
    match ext {
        "jpg" | "jpe" | "jpeg" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        "gif" => Some(ImageFormat::Gif),
        "bmp" => Some(ImageFormat::Bmp),
        _ => None,
    }
}

/// Crop to a centered square no larger than 400 pixels a side.
pub fn fit_profile_image(img: &DynamicImage) -> DynamicImage {
    let side = img.width().max(img.height()).min(PROFILE_IMAGE_MAX).max(1);
    img.resize_to_fill(side, side, FilterType::Lanczos3)
}

fn write_image(img: &DynamicImage, path: &Path, format: ImageFormat) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::Internal(format!("Failed to create {}: {}", parent.display(), e)))?;
    }
    match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()).save_with_format(path, format)?,
        _ => img.save_with_format(path, format)?,
    }
    Ok(())
}

/// Store an uploaded profile image as `<user_id>_profile_image.jpg`, keyed
/// on the id because usernames can change. Returns the stored file name.
pub async fn save_profile_image(
    uploads: PathBuf,
    user_id: i64,
    filename: String,
    data: Vec<u8>,
) -> AppResult<String> {
    if !is_allowed_profile_image(&filename) {
        return Err(AppError::Validation(
            "Profile images must be jpg or png files.".to_string(),
        ));
    }

    tokio::task::spawn_blocking(move || -> AppResult<String> {
        let img = image::load_from_memory(&data)?;
        let fitted = fit_profile_image(&img);
        let stored = format!("{}_profile_image.jpg", user_id);
        let path = uploads.join(PROFILE_IMAGE_DIR).join(&stored);
        write_image(&fitted, &path, ImageFormat::Jpeg)?;
        debug!(path = %path.display(), width = fitted.width(), "Stored profile image");
        Ok(stored)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Image task failed: {}", e)))?
}

/// Store an uploaded post image as `<post_id>_post_image.<ext>`. The upload
/// is decoded and re-encoded, so only real images are kept.
pub async fn save_post_image(
    uploads: PathBuf,
    post_id: i64,
    filename: String,
    data: Vec<u8>,
) -> AppResult<String> {
    let ext = allowed_extension(&filename, POST_EXTENSIONS).ok_or_else(|| {
        AppError::Validation("Post images must be jpg, jpe, jpeg, png, gif or bmp files.".to_string())
    })?;
    let format = format_for(&ext)
        .ok_or_else(|| AppError::Internal(format!("No encoder for .{}", ext)))?;

    tokio::task::spawn_blocking(move || -> AppResult<String> {
        let img = image::load_from_memory(&data)?;
        let stored = format!("{}_post_image.{}", post_id, ext);
        let path = uploads.join(POST_IMAGE_DIR).join(&stored);
        write_image(&img, &path, format)?;
        debug!(path = %path.display(), "Stored post image");
        Ok(stored)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Image task failed: {}", e)))?
}

/// Delete a stored upload. A file that is already gone is not an error.
pub async fn remove_upload(uploads: &Path, dir: &str, stored: &str) -> AppResult<()> {
    let path = uploads.join(dir).join(stored);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::Internal(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    /// PNG bytes of a solid image.
    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 30, 30]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn extension_allow_lists() {
        assert!(is_allowed_profile_image("me.JPG"));
        assert!(is_allowed_profile_image("me.png"));
        assert!(!is_allowed_profile_image("me.gif"));
        assert!(is_allowed_post_image("cover.jpe"));
        assert!(is_allowed_post_image("cover.BMP"));
        assert!(!is_allowed_post_image("cover.svg"));
        assert!(!is_allowed_post_image("noext"));
    }

    #[test]
    fn profile_fit_caps_at_400_square() {
        let big = DynamicImage::ImageRgb8(RgbImage::new(1200, 600));
        let fitted = fit_profile_image(&big);
        assert_eq!((fitted.width(), fitted.height()), (400, 400));

        let small = DynamicImage::ImageRgb8(RgbImage::new(120, 80));
        let fitted = fit_profile_image(&small);
        assert_eq!((fitted.width(), fitted.height()), (120, 120));
    }

    #[tokio::test]
    async fn save_profile_image_writes_jpeg() {
        let tmp = tempfile::tempdir().unwrap();
        let stored = save_profile_image(
            tmp.path().to_path_buf(),
            7,
            "me.png".into(),
            png_bytes(800, 500),
        )
        .await
        .unwrap();

        assert_eq!(stored, "7_profile_image.jpg");
        let saved = image::open(tmp.path().join(PROFILE_IMAGE_DIR).join(&stored)).unwrap();
        assert_eq!((saved.width(), saved.height()), (400, 400));
    }

    #[tokio::test]
    async fn save_post_image_rejects_non_images() {
        let tmp = tempfile::tempdir().unwrap();
        let result = save_post_image(
            tmp.path().to_path_buf(),
            1,
            "fake.png".into(),
            b"definitely not a png".to_vec(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Image(_))));

        let wrong_ext = save_post_image(
            tmp.path().to_path_buf(),
            1,
            "evil.svg".into(),
            png_bytes(4, 4),
        )
        .await;
        assert!(matches!(wrong_ext, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn save_post_image_keeps_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let stored = save_post_image(tmp.path().to_path_buf(), 7, "Cover.PNG".into(), png_bytes(10, 10))
            .await
            .unwrap();
        assert_eq!(stored, "7_post_image.png");
        assert!(tmp.path().join(POST_IMAGE_DIR).join(&stored).exists());

        remove_upload(tmp.path(), POST_IMAGE_DIR, &stored).await.unwrap();
        remove_upload(tmp.path(), POST_IMAGE_DIR, &stored).await.unwrap();
        assert!(!tmp.path().join(POST_IMAGE_DIR).join(&stored).exists());
    }
}
