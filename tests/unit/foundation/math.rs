use super::*;

#[test]
fn mul_div255_rounds() {
    assert_eq!(mul_div255_u16(255, 255), 255);
    assert_eq!(mul_div255_u16(128, 255), 128);
    assert_eq!(mul_div255_u16(0, 200), 0);
}

#[test]
fn over_opaque_source_replaces_destination() {
    assert_eq!(over([10, 20, 30, 255], [1, 2, 3, 255], 1.0), [1, 2, 3, 255]);
}

#[test]
fn over_zero_opacity_keeps_destination() {
    assert_eq!(over([10, 20, 30, 255], [1, 2, 3, 255], 0.0), [10, 20, 30, 255]);
}

#[test]
fn premultiply_round_trips_opaque_and_half_alpha() {
    assert_eq!(unpremultiply(premultiply([9, 8, 7, 255])), [9, 8, 7, 255]);
    let p = premultiply([255, 0, 0, 128]);
    assert_eq!(p, [128, 0, 0, 128]);
    assert_eq!(unpremultiply(p), [255, 0, 0, 128]);
    assert_eq!(unpremultiply([3, 3, 3, 0]), [0, 0, 0, 0]);
}
