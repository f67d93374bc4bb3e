//! Box overlay for published frames.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect as PixelRect;

use crate::tracker::Track;

const UNLOCKED: Rgb<u8> = Rgb([0, 200, 0]);
const LOCKED: Rgb<u8> = Rgb([255, 170, 0]);

/// Copy of `frame` with a box around every track; tracks holding a plate
/// get a second colour.
pub fn annotate<'a>(frame: &RgbImage, tracks: impl IntoIterator<Item = &'a Track>) -> RgbImage {
    let mut canvas = frame.clone();
    for track in tracks {
        let Some((x, y, w, h)) = track
            .last_detection()
            .pixel_region(canvas.width(), canvas.height())
        else {
            continue;
        };
        let colour = if track.plate().is_some() { LOCKED } else { UNLOCKED };
        let outline = PixelRect::at(x as i32, y as i32).of_size(w, h);
        draw_hollow_rect_mut(&mut canvas, outline, colour);
        if w > 2 && h > 2 {
            let inner = PixelRect::at(x as i32 + 1, y as i32 + 1).of_size(w - 2, h - 2);
            draw_hollow_rect_mut(&mut canvas, inner, colour);
        }
    }
    canvas
}
