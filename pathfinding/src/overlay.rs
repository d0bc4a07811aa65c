use common_types::{Position, Stop, StopKind};
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageError, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("image decode: {0}")]
    Decode(#[source] ImageError),

    #[error("encode png: {0}")]
    Encode(#[source] ImageError),
}

const ROUTE: Rgba<u8> = Rgba([0, 0, 255, 220]);
const START: Rgba<u8> = Rgba([0, 200, 0, 255]);
const GOAL: Rgba<u8> = Rgba([230, 0, 0, 255]);
const BEACON: Rgba<u8> = Rgba([0, 140, 255, 255]);

/// Draw a route and its stops over a rasterized floor plan.
///
/// `origin` is the plan coordinate that maps to pixel (0, 0), i.e. the
/// top-left corner of the SVG viewBox the map was rasterized from.
pub fn render_route_overlay(
    png_bytes: &[u8],
    origin: Position,
    path: &[Position],
    stops: &[Stop],
) -> Result<Vec<u8>, OverlayError> {
    let mut canvas: RgbaImage = image::load_from_memory(png_bytes)
        .map_err(OverlayError::Decode)?
        .to_rgba8();

    let px = |p: &Position| ((p.x - origin.x) as f32, (p.y - origin.y) as f32);

    // thick line: offset copies of each segment
    for w in path.windows(2) {
        let (a, b) = (px(&w[0]), px(&w[1]));
        for k in -1..=1 {
            for t in -1..=1 {
                let (dk, dt) = (k as f32, t as f32);
                draw_line_segment_mut(&mut canvas, (a.0 + dk, a.1 + dt), (b.0 + dk, b.1 + dt), ROUTE);
            }
        }
    }

    for stop in stops {
        let Some(p) = path.get(stop.index) else { continue };
        let (x, y) = px(p);
        let color = match stop.kind {
            StopKind::Beacon => BEACON,
            StopKind::Destination => GOAL,
        };
        draw_filled_circle_mut(&mut canvas, (x.round() as i32, y.round() as i32), 5, color);
    }

    if let Some(s) = path.first() {
        let (x, y) = px(s);
        draw_filled_circle_mut(&mut canvas, (x.round() as i32, y.round() as i32), 4, START);
    }

    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(&canvas, canvas.width(), canvas.height(), image::ColorType::Rgba8.into())
        .map_err(OverlayError::Encode)?;
    Ok(buf)
}
