use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use burn::data::dataset::vision::MnistItem;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use crate::data::{HEIGHT, WIDTH};

pub type TestBackend = burn::backend::NdArray<f32>;
pub type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;

/// A light-on-dark canvas with a vertical bar, roughly what a drawn "1" looks like.
pub fn drawn_one(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, _| {
        let center = width / 2;
        let half = (width / 10).max(1);
        if x + half >= center && x <= center + half {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// The same image with every intensity flipped.
pub fn inverted(image: &GrayImage) -> GrayImage {
    let mut image = image.clone();
    image::imageops::invert(&mut image);
    image
}

pub fn png_bytes(image: &GrayImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image.clone())
        .write_to(&mut bytes, ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

pub fn data_uri(image: &GrayImage) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png_bytes(image)))
}

/// Small deterministic dataset where each label draws a bar at its own column.
pub fn synthetic_items(count: usize) -> Vec<MnistItem> {
    (0..count)
        .map(|index| {
            let label = (index % 10) as u8;
            let mut image = [[0f32; WIDTH]; HEIGHT];
            let column = 4 + 2 * label as usize;
            for row in image.iter_mut().skip(4).take(20) {
                row[column] = 255.0;
                row[column + 1] = 255.0;
            }
            MnistItem { image, label }
        })
        .collect()
}
