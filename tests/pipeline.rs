//! End-to-end loads through the public `ImageLoader`.

use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{Delay, ExtendedColorType, Frame, ImageEncoder, Rgba, RgbaImage};
use pixload::config::LoaderConfig;
use pixload::imaging::{Codec, CodecError, CodecSet, FrameDecoder, Source};
use pixload::{FormatTag, ImageLoader, LoadResult, RequestHandle, ViewParams};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(30);

fn write(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let pixels: Vec<u8> = (0..width * height)
        .flat_map(|i| [(i % 256) as u8, 128, 64])
        .collect();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .write_image(&pixels, width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

fn transparent_png(width: u32, height: u32) -> Vec<u8> {
    let pixels = RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 0]));
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(pixels.as_raw(), width, height, ExtendedColorType::Rgba8)
        .unwrap();
    out
}

fn gif(width: u32, height: u32, frames: u32) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut out);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        for i in 0..frames {
            let level = (i * 40) as u8;
            let image = RgbaImage::from_pixel(width, height, Rgba([level, level, level, 255]));
            let delay = Delay::from_numer_denom_ms(50, 1);
            encoder
                .encode_frame(Frame::from_parts(image, 0, 0, delay))
                .unwrap();
        }
    }
    out
}

fn load(loader: &ImageLoader, path: &Path, frame: u32, view: ViewParams) -> LoadResult {
    let (tx, rx) = mpsc::channel();
    let handle = loader.submit(path, frame, view, Some(tx));
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().handle, handle);
    loader.collect(handle).unwrap()
}

#[test]
fn jpeg_loads_with_layout_and_display_buffer() {
    let tmp = TempDir::new().unwrap();
    let data = jpeg(200, 100);
    let path = write(tmp.path(), "photo.jpg", &data);
    let loader = ImageLoader::new(LoaderConfig::default()).unwrap();

    let result = load(&loader, &path, 0, ViewParams::fit(100, 100));
    assert!(!result.out_of_memory && !result.exception);
    let image = result.image.unwrap();
    assert_eq!(image.format, FormatTag::Jpeg);
    assert_eq!((image.width, image.height, image.channels), (200, 100, 3));
    assert_ne!(image.content_hash, 0);
    assert!(image.load_duration > Duration::ZERO);

    let layout = image.layout.unwrap();
    assert_eq!(layout.full, (100, 50));
    assert_eq!(layout.clip, (100, 50));
    let display = image.display_buffer().unwrap();
    assert_eq!(display.pixels.len(), 100 * 50 * 4);
}

#[test]
fn results_are_delivered_once() {
    let tmp = TempDir::new().unwrap();
    let path = write(tmp.path(), "photo.jpg", &jpeg(16, 16));
    let loader = ImageLoader::new(LoaderConfig::default()).unwrap();

    let handle = loader.submit(&path, 0, ViewParams::fit(64, 64), None);
    assert!(loader.wait(handle, TIMEOUT).unwrap().image.is_some());
    assert!(loader.collect(handle).is_none());
    assert!(loader.state(handle).is_none());
}

#[test]
fn transparent_png_is_blended_onto_background() {
    let tmp = TempDir::new().unwrap();
    let path = write(tmp.path(), "clear.png", &transparent_png(8, 8));
    let loader = ImageLoader::new(LoaderConfig::default()).unwrap();

    let image = load(&loader, &path, 0, ViewParams::fit(8, 8)).image.unwrap();
    assert_eq!(image.channels, 4);
    assert!(image.pixels.chunks(4).all(|px| px == [255, 255, 255, 255]));
}

#[test]
fn oversized_file_reports_out_of_memory() {
    let tmp = TempDir::new().unwrap();
    let path = write(tmp.path(), "big.png", &transparent_png(64, 64));
    let mut config = LoaderConfig::default();
    config.limits.max_png_file_size = 16;
    let loader = ImageLoader::new(config).unwrap();

    let result = load(&loader, &path, 0, ViewParams::fit(64, 64));
    assert!(result.image.is_none());
    assert!(result.out_of_memory);
    assert!(!result.exception);
}

#[test]
fn missing_file_sets_no_flags() {
    let tmp = TempDir::new().unwrap();
    let loader = ImageLoader::new(LoaderConfig::default()).unwrap();

    let result = load(&loader, &tmp.path().join("gone.jpg"), 0, ViewParams::fit(8, 8));
    assert!(result.image.is_none());
    assert!(!result.out_of_memory && !result.exception);
}

#[test]
fn animated_gif_frames_come_from_the_cached_decoder() {
    let tmp = TempDir::new().unwrap();
    let path = write(tmp.path(), "anim.gif", &gif(6, 4, 3));
    let loader = ImageLoader::new(LoaderConfig::default()).unwrap();

    let first = load(&loader, &path, 0, ViewParams::fit(6, 4)).image.unwrap();
    assert!(first.animated);
    assert_eq!(first.frame_count, 3);
    assert_eq!(first.duration_ms, 50);

    // The open decoder is reused, so the file is no longer needed.
    std::fs::remove_file(&path).unwrap();
    let last = load(&loader, &path, 7, ViewParams::fit(6, 4)).image.unwrap();
    assert_eq!(last.frame_index, 2);
    assert!(last.pixels[0] > first.pixels[0].saturating_add(40));

    // Releasing drops the decoder; the deleted file can no longer load.
    loader.release(&path);
    let gone = load(&loader, &path, 1, ViewParams::fit(6, 4));
    assert!(gone.image.is_none());
}

#[test]
fn user_rotation_swaps_dimensions() {
    let tmp = TempDir::new().unwrap();
    let path = write(tmp.path(), "photo.jpg", &jpeg(40, 20));
    let loader = ImageLoader::new(LoaderConfig::default()).unwrap();

    let mut view = ViewParams::fit(100, 100);
    view.user_rotation = 270;
    let image = load(&loader, &path, 0, view).image.unwrap();
    assert_eq!((image.width, image.height), (20, 40));
    assert_eq!(image.rotation, 270);
}

struct Exploding;

impl Codec for Exploding {
    fn name(&self) -> &'static str {
        "exploding"
    }

    fn open(&self, _data: Vec<u8>) -> Result<Box<dyn FrameDecoder>, CodecError> {
        panic!("codec blew up");
    }
}

#[test]
fn panicking_codec_is_contained() {
    let tmp = TempDir::new().unwrap();
    let bad = write(tmp.path(), "bad.tga", b"\0\0\x02\0\0\0\0\0\0\0\0\0");
    let good = write(tmp.path(), "good.jpg", &jpeg(8, 8));
    let config = LoaderConfig::default();
    let codecs = CodecSet::builtin(&config.limits).with(Source::Tga, Exploding);
    let loader = ImageLoader::with_codecs(config, codecs).unwrap();

    let result = load(&loader, &bad, 0, ViewParams::fit(8, 8));
    assert!(result.exception);
    assert!(result.image.is_none());

    let result = load(&loader, &good, 0, ViewParams::fit(8, 8));
    assert!(result.image.is_some());
}

#[test]
fn handles_increase_across_loaders() {
    let tmp = TempDir::new().unwrap();
    let path = write(tmp.path(), "photo.jpg", &jpeg(8, 8));
    let a = ImageLoader::new(LoaderConfig::default()).unwrap();
    let b = ImageLoader::new(LoaderConfig::default()).unwrap();

    let handles: Vec<RequestHandle> = (0..4)
        .map(|i| {
            let loader = if i % 2 == 0 { &a } else { &b };
            loader.submit(&path, 0, ViewParams::fit(8, 8), None)
        })
        .collect();
    assert!(handles.windows(2).all(|w| w[0] < w[1]));
}
