use image::DynamicImage;
use std::io::Cursor;

use super::proxy::{REQUEST_TIMEOUT, build_client};

async fn fetch_image(url: &str) -> Option<DynamicImage> {
    if url.is_empty() {
        return None;
    }

    let client = build_client(REQUEST_TIMEOUT).ok()?;
    let response = client.get(url).send().await.ok()?;
    if !response.status().is_success() {
        log::debug!("image {url} returned HTTP {}", response.status());
        return None;
    }
    let bytes = response.bytes().await.ok()?;

    decode_image(&bytes)
}

fn decode_image(bytes: &[u8]) -> Option<DynamicImage> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .decode()
        .ok()
}

pub async fn fetch_cover_image(cover_url: &str) -> Option<DynamicImage> {
    fetch_image(cover_url).await
}

pub async fn fetch_page_image(page_url: &str) -> Option<DynamicImage> {
    let image = fetch_image(page_url).await;
    if image.is_none() {
        log::warn!("failed to load page image {page_url}");
    }
    image
}
