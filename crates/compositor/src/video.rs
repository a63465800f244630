//! Video compositing: aspect-preserving fit and source-over blending.

use simpleobs_common::error::{ObsError, ObsResult};
use simpleobs_media::frame::{PixelFormat, VideoFrame};

/// Placement of a source frame on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitRect {
    /// Left edge in canvas pixels.
    pub x: u32,
    /// Top edge in canvas pixels.
    pub y: u32,
    /// Width in canvas pixels.
    pub width: u32,
    /// Height in canvas pixels.
    pub height: u32,
}

/// Scale a `src_w x src_h` frame to fit inside the canvas, preserving aspect
/// ratio, centered. The uncovered band is left untouched (transparent pad).
pub fn fit_rect(src_w: u32, src_h: u32, canvas_w: u32, canvas_h: u32) -> Option<FitRect> {
    if src_w == 0 || src_h == 0 || canvas_w == 0 || canvas_h == 0 {
        return None;
    }

    if src_w == canvas_w && src_h == canvas_h {
        return Some(FitRect {
            x: 0,
            y: 0,
            width: canvas_w,
            height: canvas_h,
        });
    }

    let scale = (canvas_w as f64 / src_w as f64).min(canvas_h as f64 / src_h as f64);
    let width = ((src_w as f64 * scale).round() as u32).clamp(1, canvas_w);
    let height = ((src_h as f64 * scale).round() as u32).clamp(1, canvas_h);

    Some(FitRect {
        x: (canvas_w - width) / 2,
        y: (canvas_h - height) / 2,
        width,
        height,
    })
}

/// Blend one straight-alpha RGBA pixel over `dst` in place.
///
/// `out.rgb = src.rgb * a + dst.rgb * (1 - a)`, `out.a = a + dst.a * (1 - a)`.
#[inline]
pub fn blend_pixel(dst: &mut [u8], src: [u8; 4]) {
    match src[3] {
        255 => dst[..4].copy_from_slice(&src),
        0 => {}
        alpha => {
            let a = alpha as f32 / 255.0;
            let inv = 1.0 - a;
            for c in 0..3 {
                let out = src[c] as f32 * a + dst[c] as f32 * inv;
                dst[c] = out.round().clamp(0.0, 255.0) as u8;
            }
            let da = dst[3] as f32 / 255.0;
            dst[3] = ((a + da * inv) * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Paint `src` over `canvas`, scaled with nearest-neighbour sampling into its
/// [`fit_rect`].
///
/// The source frame is validated before any canvas pixel is written, so a
/// rejected frame leaves the canvas unchanged.
pub fn composite_over(canvas: &mut VideoFrame, src: &VideoFrame) -> ObsResult<()> {
    if canvas.format != PixelFormat::Rgba8 {
        return Err(ObsError::frame(format!(
            "canvas must be Rgba8, got {:?}",
            canvas.format
        )));
    }
    if src.format.bytes_per_pixel().is_none() {
        return Err(ObsError::frame(format!(
            "{:?} frames need a conversion filter before compositing",
            src.format
        )));
    }
    canvas.validate()?;
    src.validate()?;

    let rect = fit_rect(src.width, src.height, canvas.width, canvas.height)
        .ok_or_else(|| ObsError::frame("empty source frame"))?;

    let swap = src.format == PixelFormat::Bgra8;
    let src_plane = &src.planes[0];
    let dst_stride = canvas.planes[0].stride;
    let dst = &mut canvas.planes[0].data;

    for dy in 0..rect.height as usize {
        let sy = dy * src.height as usize / rect.height as usize;
        let src_row = &src_plane.data[sy * src_plane.stride..];
        let dst_row_start = (rect.y as usize + dy) * dst_stride + rect.x as usize * 4;

        for dx in 0..rect.width as usize {
            let sx = dx * src.width as usize / rect.width as usize;
            let p = &src_row[sx * 4..sx * 4 + 4];
            let rgba = if swap {
                [p[2], p[1], p[0], p[3]]
            } else {
                [p[0], p[1], p[2], p[3]]
            };
            let offset = dst_row_start + dx * 4;
            blend_pixel(&mut dst[offset..offset + 4], rgba);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fit_same_size_is_identity() {
        assert_eq!(
            fit_rect(1920, 1080, 1920, 1080),
            Some(FitRect {
                x: 0,
                y: 0,
                width: 1920,
                height: 1080
            })
        );
    }

    #[test]
    fn test_fit_letterboxes_4_3_into_16_9() {
        let rect = fit_rect(640, 480, 1920, 1080).unwrap();
        assert_eq!(rect.height, 1080);
        assert_eq!(rect.width, 1440);
        assert_eq!(rect.x, 240);
        assert_eq!(rect.y, 0);
    }

    #[test]
    fn test_fit_pillarboxes_wide_source() {
        let rect = fit_rect(400, 100, 200, 200).unwrap();
        assert_eq!(rect.width, 200);
        assert_eq!(rect.height, 50);
        assert_eq!(rect.y, 75);
    }

    #[test]
    fn test_fit_rejects_empty() {
        assert_eq!(fit_rect(0, 10, 100, 100), None);
    }

    #[test]
    fn test_blend_opaque_replaces() {
        let mut dst = [255, 0, 0, 255];
        blend_pixel(&mut dst, [0, 0, 255, 255]);
        assert_eq!(dst, [0, 0, 255, 255]);
    }

    #[test]
    fn test_blend_half_alpha_over_opaque() {
        let mut dst = [0, 0, 0, 255];
        blend_pixel(&mut dst, [255, 255, 255, 128]);
        // 255 * 128/255 = 128
        assert_eq!(dst, [128, 128, 128, 255]);
    }

    #[test]
    fn test_blend_over_transparent_accumulates_alpha() {
        let mut dst = [0, 0, 0, 0];
        blend_pixel(&mut dst, [200, 100, 50, 51]);
        assert_eq!(dst[3], 51);
        blend_pixel(&mut dst, [200, 100, 50, 0]);
        assert_eq!(dst[3], 51);
    }

    #[test]
    fn test_composite_pads_outside_fit_rect() {
        let mut canvas = VideoFrame::new(4, 2, PixelFormat::Rgba8);
        let src = VideoFrame::solid(1, 1, [0, 255, 0, 255]);
        composite_over(&mut canvas, &src).unwrap();

        assert_eq!(canvas.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(canvas.pixel(1, 0), Some([0, 255, 0, 255]));
        assert_eq!(canvas.pixel(2, 1), Some([0, 255, 0, 255]));
        assert_eq!(canvas.pixel(3, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_composite_swizzles_bgra() {
        let mut canvas = VideoFrame::new(2, 2, PixelFormat::Rgba8);
        let mut src = VideoFrame::new(2, 2, PixelFormat::Bgra8);
        src.fill([255, 0, 0, 255]);
        composite_over(&mut canvas, &src).unwrap();
        assert_eq!(canvas.pixel(1, 1), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_composite_rejects_planar_without_touching_canvas() {
        let mut canvas = VideoFrame::solid(2, 2, [9, 9, 9, 255]);
        let before = canvas.clone();
        let src = VideoFrame::new(2, 2, PixelFormat::I420);
        assert!(composite_over(&mut canvas, &src).is_err());
        assert_eq!(canvas, before);
    }

    proptest! {
        #[test]
        fn fit_rect_stays_inside_canvas(
            sw in 1u32..4000, sh in 1u32..4000, cw in 1u32..4000, ch in 1u32..4000
        ) {
            let rect = fit_rect(sw, sh, cw, ch).unwrap();
            prop_assert!(rect.x + rect.width <= cw);
            prop_assert!(rect.y + rect.height <= ch);
            // One axis always spans the canvas.
            prop_assert!(rect.width == cw || rect.height == ch);
        }
    }
}
