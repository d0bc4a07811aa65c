use common_types::Position;

use crate::settings::NavSettings;

/// Pan/zoom transform for the map view: `screen = map * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    scale: f64,
    offset: Position,
    min_zoom: f64,
    max_zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        let s = NavSettings::default();
        Self::new(s.min_zoom, s.max_zoom)
    }
}

impl Viewport {
    /// Bounds go through [`NavSettings::sanitized`], so they are always
    /// finite, positive and ordered.
    pub fn new(min_zoom: f64, max_zoom: f64) -> Self {
        let s = NavSettings { min_zoom, max_zoom, ..NavSettings::default() }.sanitized();
        Self { scale: 1.0, offset: Position::default(), min_zoom: s.min_zoom, max_zoom: s.max_zoom }
    }

    pub fn from_settings(settings: &NavSettings) -> Self {
        Self::new(settings.min_zoom, settings.max_zoom)
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn offset(&self) -> Position {
        self.offset
    }

    pub fn reset(&mut self) {
        self.scale = 1.0;
        self.offset = Position::default();
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.offset.x += dx;
        self.offset.y += dy;
    }

    /// Scale by `factor` keeping the map point under `cursor` (screen space)
    /// fixed. Returns the new scale. Non-finite or non-positive factors are
    /// ignored.
    pub fn zoom_at(&mut self, cursor: Position, factor: f64) -> f64 {
        if !(factor.is_finite() && factor > 0.0) {
            return self.scale;
        }
        let next = (self.scale * factor).clamp(self.min_zoom, self.max_zoom);
        let z = next / self.scale;
        let p = Position::new(cursor.x - self.offset.x, cursor.y - self.offset.y);
        self.offset = Position::new(self.offset.x + p.x - p.x * z, self.offset.y + p.y - p.y * z);
        self.scale = next;
        next
    }

    /// One wheel notch: negative `delta_y` zooms in. A `step` that does not
    /// grow the scale is replaced by the default.
    pub fn wheel(&mut self, cursor: Position, delta_y: f64, step: f64) -> f64 {
        let step = NavSettings { zoom_step: step, ..NavSettings::default() }.sanitized().zoom_step;
        let factor = if delta_y < 0.0 { step } else { 1.0 / step };
        self.zoom_at(cursor, factor)
    }

    pub fn to_screen(&self, map: Position) -> Position {
        Position::new(map.x * self.scale + self.offset.x, map.y * self.scale + self.offset.y)
    }

    pub fn to_map(&self, screen: Position) -> Position {
        Position::new((screen.x - self.offset.x) / self.scale, (screen.y - self.offset.y) / self.scale)
    }

    /// SVG/CSS `matrix(...)` for the current transform.
    pub fn css_matrix(&self) -> String {
        format!("matrix({s},0,0,{s},{},{})", self.offset.x, self.offset.y, s = self.scale)
    }
}
