// Property tests for mask binarization
use image::{Rgba, RgbaImage};
use image_studio::studio::{
    MASK_BLACK, MASK_WHITE, MaskRule, RawMaskImage, binarize, normalize_mask, normalize_uploaded_mask, renormalize,
};
use proptest::prelude::*;

fn raw_image() -> impl Strategy<Value = RgbaImage> {
    (1u32..24, 1u32..24).prop_flat_map(|(width, height)| {
        prop::collection::vec(any::<[u8; 4]>(), (width * height) as usize).prop_map(move |pixels| {
            let mut image = RgbaImage::new(width, height);
            for (dst, src) in image.pixels_mut().zip(pixels) {
                *dst = Rgba(src);
            }
            image
        })
    })
}

proptest! {
    #[test]
    fn output_is_strictly_black_or_white(raw in raw_image()) {
        let binary = normalize_mask(&RawMaskImage::new(raw));

        prop_assert!(binary.as_rgba().pixels().all(|p| *p == MASK_BLACK || *p == MASK_WHITE));
    }

    #[test]
    fn normalization_is_idempotent(raw in raw_image()) {
        let once = normalize_mask(&RawMaskImage::new(raw));
        let twice = renormalize(&once);

        prop_assert_eq!(once, twice);
    }

    #[test]
    fn dimensions_are_preserved(raw in raw_image()) {
        let dims = raw.dimensions();

        prop_assert_eq!(normalize_mask(&RawMaskImage::new(raw.clone())).dimensions(), dims);
        prop_assert_eq!(normalize_uploaded_mask(&raw).dimensions(), dims);
    }

    #[test]
    fn selection_follows_alpha_only(raw in raw_image()) {
        let binary = normalize_mask(&RawMaskImage::new(raw.clone()));

        for (src, dst) in raw.pixels().zip(binary.as_rgba().pixels()) {
            let expected = if src[3] > 0 { MASK_WHITE } else { MASK_BLACK };
            prop_assert_eq!(*dst, expected);
        }
    }

    #[test]
    fn luma_rule_is_idempotent_on_its_output(raw in raw_image()) {
        let once = binarize(&raw, MaskRule::Luma { threshold: 128 });
        let twice = binarize(once.as_rgba(), MaskRule::Luma { threshold: 128 });

        prop_assert_eq!(once, twice);
    }
}
