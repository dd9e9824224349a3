use super::*;

#[test]
fn keyframes_interpolate_and_hold_ends() {
    let k = Keyframes::linear(vec![
        Keyframe {
            time: 1.0,
            value: 0.0,
        },
        Keyframe {
            time: 3.0,
            value: 1.0,
        },
    ]);
    assert_eq!(k.sample(0.0), Some(0.0));
    assert_eq!(k.sample(2.0), Some(0.5));
    assert_eq!(k.sample(9.0), Some(1.0));

    let hold = Keyframes {
        mode: InterpMode::Hold,
        ..k
    };
    assert_eq!(hold.sample(2.9), Some(0.0));
}

#[test]
fn unsorted_keys_fail_validation() {
    let k = Keyframes::linear(vec![
        Keyframe {
            time: 2.0,
            value: 0.0,
        },
        Keyframe {
            time: 1.0,
            value: 1.0,
        },
    ]);
    assert!(k.validate().is_err());
    assert!(Keyframes::<f64>::linear(Vec::new()).validate().is_err());
}

#[test]
fn opaque_item_replaces_base_pixels() {
    let mut layer = RenderLayer::new(4, 4);
    layer.add_item(OverlayItem::new(
        RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255])),
        Vec2::new(1.0, 1.0),
    ));
    let mut base = RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 255, 255]));
    layer.composite_onto(&mut base, 0.0).unwrap();
    assert_eq!(base.get_pixel(0, 0).0, [0, 0, 255, 255]);
    assert_eq!(base.get_pixel(1, 1).0, [255, 0, 0, 255]);
    assert_eq!(base.get_pixel(2, 2).0, [255, 0, 0, 255]);
    assert_eq!(base.get_pixel(3, 3).0, [0, 0, 255, 255]);
}

#[test]
fn items_respect_visibility_window_and_opacity() {
    let mut layer = RenderLayer::new(2, 1);
    layer.add_item(
        OverlayItem::new(
            RgbaImage::from_pixel(2, 1, image::Rgba([255, 255, 255, 255])),
            Vec2::ZERO,
        )
        .with_opacity(Keyframes::constant(0.5))
        .visible_between(1.0, 2.0),
    );

    let mut early = RgbaImage::from_pixel(2, 1, image::Rgba([0, 0, 0, 255]));
    layer.composite_onto(&mut early, 0.5).unwrap();
    assert_eq!(early.get_pixel(0, 0).0, [0, 0, 0, 255]);

    let mut during = RgbaImage::from_pixel(2, 1, image::Rgba([0, 0, 0, 255]));
    layer.composite_onto(&mut during, 1.5).unwrap();
    let [r, g, b, a] = during.get_pixel(1, 0).0;
    assert_eq!(a, 255);
    assert!((127..=129).contains(&r) && r == g && g == b);
}

#[test]
fn painters_receive_time() {
    let mut layer = RenderLayer::new(3, 1);
    layer.add_painter(|t, canvas| {
        let x = (t as u32).min(canvas.width() - 1);
        canvas.put_pixel(x, 0, image::Rgba([0, 255, 0, 255]));
    });
    let mut base = RgbaImage::from_pixel(3, 1, image::Rgba([0, 0, 0, 255]));
    layer.composite_onto(&mut base, 2.0).unwrap();
    assert_eq!(base.get_pixel(2, 0).0, [0, 255, 0, 255]);
    assert_eq!(base.get_pixel(0, 0).0, [0, 0, 0, 255]);
}

#[test]
fn size_mismatch_is_rejected() {
    let layer = RenderLayer::new(4, 4);
    let mut base = RgbaImage::new(2, 2);
    assert!(matches!(
        layer.composite_onto(&mut base, 0.0),
        Err(AssetError::CouldNotCreateComposition(_))
    ));
}
