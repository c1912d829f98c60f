use std::io::Cursor;

use super::*;

fn png(rgba: Vec<u8>, w: u32, h: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_raw(w, h, rgba).unwrap();
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

#[test]
fn decode_image_png_dimensions_and_premul() {
    let bitmap = decode_image(&png(vec![100, 50, 200, 128], 1, 1)).unwrap();
    assert_eq!((bitmap.width, bitmap.height), (1, 1));
    assert_eq!(
        bitmap.data.as_slice(),
        &[
            ((100u16 * 128 + 127) / 255) as u8,
            ((50u16 * 128 + 127) / 255) as u8,
            ((200u16 * 128 + 127) / 255) as u8,
            128u8
        ]
    );
}

#[test]
fn garbage_bytes_are_a_decode_error() {
    let err = decode_image(b"not an image").expect_err("garbage");
    assert!(matches!(err, EaselError::Decode(_)));
}

#[test]
fn straight_alpha_export_undoes_premultiplication() {
    let bitmap = Bitmap::new(2, 1, vec![128, 0, 64, 128, 10, 20, 30, 255]).unwrap();
    let img = to_rgba_image(&bitmap).unwrap();
    assert_eq!(img.get_pixel(0, 0).0, [255, 0, 128, 128]);
    assert_eq!(img.get_pixel(1, 0).0, [10, 20, 30, 255]);
}
