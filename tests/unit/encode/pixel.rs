use super::*;

#[test]
fn buffer_is_sized_to_frame_pixels() {
    let frame = Frame::solid(100, 100, 2.0, [10, 20, 30, 255]);
    let buf = PixelBufferConverter::convert(&frame).unwrap();
    assert_eq!((buf.width, buf.height), (200, 200));
    assert_eq!(buf.bytes_per_row(), 800);
    assert_eq!(buf.data.len(), 200 * 200 * 4);
}

#[test]
fn layout_is_alpha_first() {
    let frame = Frame::solid(1, 1, 1.0, [10, 20, 30, 255]);
    let buf = PixelBufferConverter::convert(&frame).unwrap();
    assert_eq!(buf.argb_at(0, 0), Some([255, 10, 20, 30]));
    assert_eq!(buf.argb_at(1, 0), None);
}

#[test]
fn translucent_pixels_are_premultiplied() {
    let frame = Frame::solid(1, 1, 1.0, [255, 0, 0, 128]);
    let buf = PixelBufferConverter::convert(&frame).unwrap();
    assert_eq!(buf.argb_at(0, 0), Some([128, 128, 0, 0]));
    assert_eq!(buf.swatch(), [255, 0, 0, 128]);
}

#[test]
fn empty_frames_do_not_convert() {
    let frame = Frame::new(RgbaImage::new(0, 4), 1.0);
    assert!(PixelBufferConverter::convert(&frame).is_none());
}

#[test]
fn back_conversion_restores_opaque_pixels() {
    let mut img = RgbaImage::new(2, 1);
    img.put_pixel(0, 0, image::Rgba([1, 2, 3, 255]));
    img.put_pixel(1, 0, image::Rgba([200, 100, 50, 255]));
    let buf = PixelBufferConverter::convert_image(&img).unwrap();
    assert_eq!(buf.to_rgba_image(), img);
}
