use crate::foundation::core::Bitmap;
use crate::foundation::error::{EaselError, EaselResult};
use crate::foundation::math::premultiply_rgba8_in_place;

/// Decode PNG/JPEG/... bytes into a premultiplied RGBA8 bitmap.
pub fn decode_image(bytes: &[u8]) -> EaselResult<Bitmap> {
    let dyn_img = image::load_from_memory(bytes)
        .map_err(|e| EaselError::decode(format!("decode image from memory: {e}")))?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut data = rgba.into_raw();
    premultiply_rgba8_in_place(&mut data);
    Bitmap::new(width, height, data)
}

/// Straight-alpha copy of `bitmap`, ready for encoding.
pub fn to_rgba_image(bitmap: &Bitmap) -> EaselResult<image::RgbaImage> {
    let mut straight = bitmap.data.as_slice().to_vec();
    for px in straight.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
        }
    }
    image::RgbaImage::from_raw(bitmap.width, bitmap.height, straight)
        .ok_or_else(|| EaselError::invariant("bitmap byte length does not match its size"))
}

#[cfg(test)]
#[path = "../../tests/unit/assets/decode.rs"]
mod tests;
