//! Image capability — the manipulation toolbox scripts get for the
//! captured artifact. Pure file-in/file-out operations on top of the
//! `image` crate; every op that writes records its output path so
//! chained scripts can pick it up.

use std::path::Path;
use std::sync::{Arc, Mutex};

use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgba, RgbaImage};
use rhai::{Dynamic, EvalAltResult, Module};

#[derive(Debug, thiserror::Error)]
pub enum ImgError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("image operation failed: {0}")]
    Image(String),

    #[error("bad color literal '{0}' (expected #RRGGBB or #AARRGGBB)")]
    BadColor(String),

    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
    pub mime: String,
}

pub struct ImgApi {
    last_output: Mutex<Option<String>>,
}

impl Default for ImgApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ImgApi {
    pub fn new() -> Self {
        Self {
            last_output: Mutex::new(None),
        }
    }

    pub fn info(&self, path: &str) -> Result<ImageInfo, ImgError> {
        let meta = std::fs::metadata(path).map_err(|_| ImgError::NotFound(path.to_string()))?;
        let img = load(path)?;
        Ok(ImageInfo {
            width: img.width(),
            height: img.height(),
            bytes: meta.len(),
            mime: mime_for(path),
        })
    }

    /// Base64 of the raw file bytes, not a re-encode.
    pub fn to_base64(&self, path: &str) -> Result<String, ImgError> {
        let bytes = std::fs::read(path).map_err(|_| ImgError::NotFound(path.to_string()))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// Re-encode as JPEG at the given quality (1–100).
    pub fn compress(&self, path: &str, quality: i64, out: &str) -> Result<(), ImgError> {
        if !(1..=100).contains(&quality) {
            return Err(ImgError::BadArgument(format!("quality {} out of 1..=100", quality)));
        }
        let img = load(path)?;
        let mut bytes: Vec<u8> = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality as u8);
        encoder
            .encode_image(&img.to_rgb8())
            .map_err(|e| ImgError::Image(e.to_string()))?;
        write_bytes(out, &bytes)?;
        self.record_output(out);
        Ok(())
    }

    pub fn delete(&self, path: &str) -> bool {
        std::fs::remove_file(path).is_ok()
    }

    /// Rotate in place by a multiple of 90 degrees.
    pub fn rotate(&self, path: &str, degrees: i64) -> Result<(), ImgError> {
        let img = load(path)?;
        let rotated = match degrees.rem_euclid(360) {
            0 => img,
            90 => img.rotate90(),
            180 => img.rotate180(),
            270 => img.rotate270(),
            other => {
                return Err(ImgError::BadArgument(format!(
                    "rotation {} is not a multiple of 90",
                    other
                )))
            }
        };
        self.save(&rotated, path)
    }

    pub fn crop_center(&self, path: &str, width: i64, height: i64, out: &str) -> Result<(), ImgError> {
        let img = load(path)?;
        let w = (width.max(1) as u32).min(img.width());
        let h = (height.max(1) as u32).min(img.height());
        let x = (img.width() - w) / 2;
        let y = (img.height() - h) / 2;
        self.save(&img.crop_imm(x, y, w, h), out)
    }

    /// Crop by edge ratios in [0, 1], left/top inclusive, right/bottom
    /// exclusive.
    pub fn crop_relative(
        &self,
        path: &str,
        left: f64,
        top: f64,
        right: f64,
        bottom: f64,
        out: &str,
    ) -> Result<(), ImgError> {
        if !(0.0..=1.0).contains(&left)
            || !(0.0..=1.0).contains(&top)
            || right <= left
            || bottom <= top
            || right > 1.0
            || bottom > 1.0
        {
            return Err(ImgError::BadArgument(format!(
                "crop ratios ({}, {}, {}, {}) out of order or range",
                left, top, right, bottom
            )));
        }
        let img = load(path)?;
        let (w, h) = (img.width() as f64, img.height() as f64);
        let x = (left * w) as u32;
        let y = (top * h) as u32;
        let cw = (((right - left) * w) as u32).max(1);
        let ch = (((bottom - top) * h) as u32).max(1);
        self.save(&img.crop_imm(x, y, cw, ch), out)
    }

    /// Shrink so the longest edge is at most `max_edge`; never upscales.
    pub fn resize_to_max_edge(&self, path: &str, max_edge: i64, out: &str) -> Result<(), ImgError> {
        let max_edge = positive_u32(max_edge, "max_edge")?;
        let img = load(path)?;
        if img.width().max(img.height()) <= max_edge {
            return self.save(&img, out);
        }
        let resized = img.resize(max_edge, max_edge, image::imageops::FilterType::Lanczos3);
        self.save(&resized, out)
    }

    /// Shrink to fit inside max_width × max_height; never upscales.
    pub fn resize_to_fit(
        &self,
        path: &str,
        max_width: i64,
        max_height: i64,
        out: &str,
    ) -> Result<(), ImgError> {
        let mw = positive_u32(max_width, "max_width")?;
        let mh = positive_u32(max_height, "max_height")?;
        let img = load(path)?;
        if img.width() <= mw && img.height() <= mh {
            return self.save(&img, out);
        }
        let resized = img.resize(mw, mh, image::imageops::FilterType::Lanczos3);
        self.save(&resized, out)
    }

    pub fn fill_rect(
        &self,
        path: &str,
        left: i64,
        top: i64,
        right: i64,
        bottom: i64,
        color: &str,
        out: &str,
    ) -> Result<(), ImgError> {
        let color = parse_color(color)?;
        let img = load(path)?;
        let mut canvas = img.to_rgba8();
        let (x, y, w, h) = clamp_rect(left, top, right, bottom, canvas.width(), canvas.height())?;
        for py in y..y + h {
            for px in x..x + w {
                canvas.put_pixel(px, py, color);
            }
        }
        self.save(&DynamicImage::ImageRgba8(canvas), out)
    }

    pub fn draw_rect(
        &self,
        path: &str,
        left: i64,
        top: i64,
        right: i64,
        bottom: i64,
        color: &str,
        stroke_width: f64,
        out: &str,
    ) -> Result<(), ImgError> {
        let color = parse_color(color)?;
        let img = load(path)?;
        let mut canvas = img.to_rgba8();
        let (x, y, w, h) = clamp_rect(left, top, right, bottom, canvas.width(), canvas.height())?;
        let stroke = (stroke_width.round().max(1.0) as u32).min(w.min(h));
        for py in y..y + h {
            for px in x..x + w {
                let on_border = px < x + stroke
                    || px >= x + w - stroke
                    || py < y + stroke
                    || py >= y + h - stroke;
                if on_border {
                    canvas.put_pixel(px, py, color);
                }
            }
        }
        self.save(&DynamicImage::ImageRgba8(canvas), out)
    }

    /// Blur just the given region, leaving the rest untouched.
    pub fn blur_rect(
        &self,
        path: &str,
        left: i64,
        top: i64,
        right: i64,
        bottom: i64,
        radius: i64,
        out: &str,
    ) -> Result<(), ImgError> {
        let radius = positive_u32(radius, "radius")?;
        let img = load(path)?;
        let (x, y, w, h) = clamp_rect(left, top, right, bottom, img.width(), img.height())?;
        let blurred = img.crop_imm(x, y, w, h).blur(radius as f32);
        let mut canvas = img;
        image::imageops::overlay(&mut canvas, &blurred, x as i64, y as i64);
        self.save(&canvas, out)
    }

    /// Overlay a watermark image, scaled relative to the base width.
    pub fn watermark(
        &self,
        path: &str,
        watermark_path: &str,
        position: &str,
        scale: f64,
        padding: i64,
        out: &str,
    ) -> Result<(), ImgError> {
        if !(0.0..=1.0).contains(&scale) || scale == 0.0 {
            return Err(ImgError::BadArgument(format!("scale {} out of (0, 1]", scale)));
        }
        let mut base = load(path)?;
        let mark = load(watermark_path)?;

        let target_w = ((base.width() as f64 * scale) as u32).max(1);
        let mark = if mark.width() > target_w {
            mark.resize(target_w, u32::MAX, image::imageops::FilterType::Lanczos3)
        } else {
            mark
        };

        let pad = padding.max(0) as i64;
        let (bw, bh) = (base.width() as i64, base.height() as i64);
        let (mw, mh) = (mark.width() as i64, mark.height() as i64);
        let (x, y) = match position {
            "top-left" => (pad, pad),
            "top-right" => (bw - mw - pad, pad),
            "bottom-left" => (pad, bh - mh - pad),
            "bottom-right" => (bw - mw - pad, bh - mh - pad),
            "center" => ((bw - mw) / 2, (bh - mh) / 2),
            other => {
                return Err(ImgError::BadArgument(format!(
                    "unknown watermark position '{}'",
                    other
                )))
            }
        };
        image::imageops::overlay(&mut base, &mark, x.max(0), y.max(0));
        self.save(&base, out)
    }

    /// Add solid borders around the image.
    pub fn pad(
        &self,
        path: &str,
        left: i64,
        top: i64,
        right: i64,
        bottom: i64,
        color: &str,
        out: &str,
    ) -> Result<(), ImgError> {
        if left < 0 || top < 0 || right < 0 || bottom < 0 {
            return Err(ImgError::BadArgument("negative padding".to_string()));
        }
        let color = parse_color(color)?;
        let img = load(path)?;
        let new_w = img.width() + left as u32 + right as u32;
        let new_h = img.height() + top as u32 + bottom as u32;
        let mut canvas = RgbaImage::from_pixel(new_w, new_h, color);
        image::imageops::overlay(&mut canvas, &img.to_rgba8(), left, top);
        self.save(&DynamicImage::ImageRgba8(canvas), out)
    }

    pub fn grayscale(&self, path: &str, out: &str) -> Result<(), ImgError> {
        let img = load(path)?;
        self.save(&img.grayscale(), out)
    }

    /// Mean color of a region as `#rrggbb`.
    pub fn average_color(
        &self,
        path: &str,
        left: i64,
        top: i64,
        right: i64,
        bottom: i64,
    ) -> Result<String, ImgError> {
        let img = load(path)?;
        let (x, y, w, h) = clamp_rect(left, top, right, bottom, img.width(), img.height())?;
        let rgba = img.to_rgba8();
        let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
        for py in y..y + h {
            for px in x..x + w {
                let p = rgba.get_pixel(px, py);
                r += p[0] as u64;
                g += p[1] as u64;
                b += p[2] as u64;
            }
        }
        let count = (w as u64) * (h as u64);
        Ok(format!(
            "#{:02x}{:02x}{:02x}",
            r / count,
            g / count,
            b / count
        ))
    }

    /// Path written by the most recent output-producing op.
    pub fn last_output_path(&self) -> Option<String> {
        self.last_output.lock().expect("img lock poisoned").clone()
    }

    fn save(&self, img: &DynamicImage, out: &str) -> Result<(), ImgError> {
        if let Some(parent) = Path::new(out).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // JPEG cannot carry alpha; drop it rather than erroring.
        let lower = out.to_lowercase();
        let result = if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            DynamicImage::ImageRgb8(img.to_rgb8()).save(out)
        } else {
            img.save(out)
        };
        result.map_err(|e| ImgError::Image(e.to_string()))?;
        self.record_output(out);
        Ok(())
    }

    fn record_output(&self, out: &str) {
        *self.last_output.lock().expect("img lock poisoned") = Some(out.to_string());
    }
}

fn load(path: &str) -> Result<DynamicImage, ImgError> {
    if !Path::new(path).exists() {
        return Err(ImgError::NotFound(path.to_string()));
    }
    image::open(path).map_err(|e| ImgError::Image(e.to_string()))
}

fn write_bytes(out: &str, bytes: &[u8]) -> Result<(), ImgError> {
    if let Some(parent) = Path::new(out).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(out, bytes)?;
    Ok(())
}

fn positive_u32(value: i64, name: &str) -> Result<u32, ImgError> {
    if value <= 0 {
        return Err(ImgError::BadArgument(format!("{} must be positive", name)));
    }
    Ok(value as u32)
}

/// Clamp a left/top/right/bottom rect into image bounds; right/bottom
/// are exclusive.
fn clamp_rect(
    left: i64,
    top: i64,
    right: i64,
    bottom: i64,
    width: u32,
    height: u32,
) -> Result<(u32, u32, u32, u32), ImgError> {
    let x = left.clamp(0, width as i64 - 1) as u32;
    let y = top.clamp(0, height as i64 - 1) as u32;
    let r = right.clamp(0, width as i64) as u32;
    let b = bottom.clamp(0, height as i64) as u32;
    if r <= x || b <= y {
        return Err(ImgError::BadArgument(format!(
            "empty rect ({}, {}, {}, {}) in {}x{}",
            left, top, right, bottom, width, height
        )));
    }
    Ok((x, y, r - x, b - y))
}

/// `#RRGGBB` or `#AARRGGBB`.
fn parse_color(raw: &str) -> Result<Rgba<u8>, ImgError> {
    let hex = raw.strip_prefix('#').unwrap_or(raw);
    let parse = |s: &str| u8::from_str_radix(s, 16).map_err(|_| ImgError::BadColor(raw.to_string()));
    match hex.len() {
        6 => Ok(Rgba([
            parse(&hex[0..2])?,
            parse(&hex[2..4])?,
            parse(&hex[4..6])?,
            0xff,
        ])),
        8 => Ok(Rgba([
            parse(&hex[2..4])?,
            parse(&hex[4..6])?,
            parse(&hex[6..8])?,
            parse(&hex[0..2])?,
        ])),
        _ => Err(ImgError::BadColor(raw.to_string())),
    }
}

fn mime_for(path: &str) -> String {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
    .to_string()
}

fn info_to_map(info: ImageInfo) -> rhai::Map {
    let mut map = rhai::Map::new();
    map.insert("width".into(), Dynamic::from(info.width as i64));
    map.insert("height".into(), Dynamic::from(info.height as i64));
    map.insert("bytes".into(), Dynamic::from(info.bytes as i64));
    map.insert("mime".into(), Dynamic::from(info.mime));
    map
}

fn to_eval_err(e: ImgError) -> Box<EvalAltResult> {
    e.to_string().into()
}

/// Build the `img` rhai module over a shared API handle.
pub fn module(api: Arc<ImgApi>) -> Module {
    let mut module = Module::new();

    let h = api.clone();
    module.set_native_fn("info", move |path: &str| {
        h.info(path).map(info_to_map).map_err(to_eval_err)
    });

    let h = api.clone();
    module.set_native_fn("to_base64", move |path: &str| {
        h.to_base64(path).map_err(to_eval_err)
    });

    let h = api.clone();
    module.set_native_fn("compress", move |path: &str, quality: i64, out: &str| {
        h.compress(path, quality, out).map(|_| true).map_err(to_eval_err)
    });

    let h = api.clone();
    module.set_native_fn("delete", move |path: &str| Ok(h.delete(path)));

    let h = api.clone();
    module.set_native_fn("rotate", move |path: &str, degrees: i64| {
        h.rotate(path, degrees).map(|_| true).map_err(to_eval_err)
    });

    let h = api.clone();
    module.set_native_fn(
        "crop_center",
        move |path: &str, width: i64, height: i64, out: &str| {
            h.crop_center(path, width, height, out)
                .map(|_| true)
                .map_err(to_eval_err)
        },
    );

    let h = api.clone();
    module.set_native_fn(
        "crop_relative",
        move |path: &str, left: f64, top: f64, right: f64, bottom: f64, out: &str| {
            h.crop_relative(path, left, top, right, bottom, out)
                .map(|_| true)
                .map_err(to_eval_err)
        },
    );

    let h = api.clone();
    module.set_native_fn("resize_to_max_edge", move |path: &str, max_edge: i64, out: &str| {
        h.resize_to_max_edge(path, max_edge, out)
            .map(|_| true)
            .map_err(to_eval_err)
    });

    let h = api.clone();
    module.set_native_fn(
        "resize_to_fit",
        move |path: &str, max_width: i64, max_height: i64, out: &str| {
            h.resize_to_fit(path, max_width, max_height, out)
                .map(|_| true)
                .map_err(to_eval_err)
        },
    );

    let h = api.clone();
    module.set_native_fn(
        "fill_rect",
        move |path: &str, left: i64, top: i64, right: i64, bottom: i64, color: &str, out: &str| {
            h.fill_rect(path, left, top, right, bottom, color, out)
                .map(|_| true)
                .map_err(to_eval_err)
        },
    );

    let h = api.clone();
    module.set_native_fn(
        "draw_rect",
        move |path: &str,
              left: i64,
              top: i64,
              right: i64,
              bottom: i64,
              color: &str,
              stroke_width: f64,
              out: &str| {
            h.draw_rect(path, left, top, right, bottom, color, stroke_width, out)
                .map(|_| true)
                .map_err(to_eval_err)
        },
    );

    let h = api.clone();
    module.set_native_fn(
        "blur_rect",
        move |path: &str, left: i64, top: i64, right: i64, bottom: i64, radius: i64, out: &str| {
            h.blur_rect(path, left, top, right, bottom, radius, out)
                .map(|_| true)
                .map_err(to_eval_err)
        },
    );

    let h = api.clone();
    module.set_native_fn(
        "watermark",
        move |path: &str, watermark_path: &str, position: &str, scale: f64, padding: i64, out: &str| {
            h.watermark(path, watermark_path, position, scale, padding, out)
                .map(|_| true)
                .map_err(to_eval_err)
        },
    );

    let h = api.clone();
    module.set_native_fn(
        "pad",
        move |path: &str, left: i64, top: i64, right: i64, bottom: i64, color: &str, out: &str| {
            h.pad(path, left, top, right, bottom, color, out)
                .map(|_| true)
                .map_err(to_eval_err)
        },
    );

    let h = api.clone();
    module.set_native_fn("grayscale", move |path: &str, out: &str| {
        h.grayscale(path, out).map(|_| true).map_err(to_eval_err)
    });

    let h = api.clone();
    module.set_native_fn(
        "average_color",
        move |path: &str, left: i64, top: i64, right: i64, bottom: i64| {
            h.average_color(path, left, top, right, bottom).map_err(to_eval_err)
        },
    );

    let h = api;
    module.set_native_fn("last_output", move || {
        Ok(h.last_output_path().unwrap_or_default())
    });

    module
}
