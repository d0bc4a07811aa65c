use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Tunables for routing, walking and the map viewport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavSettings {
    /// Delay between walk steps.
    pub tick_interval_ms: u64,
    /// A beacon triggers a stop when the path passes within this distance.
    pub trigger_radius: f64,
    /// How far a road may be from a shelf and still count as its front.
    pub shelf_reach: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Zoom factor applied per wheel notch.
    pub zoom_step: f64,
}

impl Default for NavSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            trigger_radius: 50.0,
            shelf_reach: 4.0,
            min_zoom: 0.4,
            max_zoom: 3.0,
            zoom_step: 1.1,
        }
    }
}

impl NavSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Apply `MMS_*` environment overrides on top of `self`.
    pub fn with_env_overrides(self) -> Self {
        Self {
            tick_interval_ms: try_load("MMS_TICK_MS", self.tick_interval_ms),
            trigger_radius: try_load("MMS_TRIGGER_RADIUS", self.trigger_radius),
            shelf_reach: try_load("MMS_SHELF_REACH", self.shelf_reach),
            ..self
        }
        .sanitized()
    }

    /// Replace values the viewport cannot work with. Inverted zoom bounds
    /// are swapped; non-finite or non-positive bounds and a zoom step that
    /// does not grow the scale fall back to the defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        let usable = |z: f64| z.is_finite() && z > 0.0;

        if !usable(self.min_zoom) || !usable(self.max_zoom) {
            warn!(
                "Invalid zoom bounds {}..{}, using {}..{}",
                self.min_zoom, self.max_zoom, defaults.min_zoom, defaults.max_zoom
            );
            self.min_zoom = defaults.min_zoom;
            self.max_zoom = defaults.max_zoom;
        } else if self.min_zoom > self.max_zoom {
            warn!("minZoom {} above maxZoom {}, swapping", self.min_zoom, self.max_zoom);
            std::mem::swap(&mut self.min_zoom, &mut self.max_zoom);
        }

        if !(self.zoom_step.is_finite() && self.zoom_step > 1.0) {
            warn!("Invalid zoomStep {}, using {}", self.zoom_step, defaults.zoom_step);
            self.zoom_step = defaults.zoom_step;
        }
        if !(self.trigger_radius.is_finite() && self.trigger_radius >= 0.0) {
            warn!("Invalid triggerRadius {}, using {}", self.trigger_radius, defaults.trigger_radius);
            self.trigger_radius = defaults.trigger_radius;
        }
        if !(self.shelf_reach.is_finite() && self.shelf_reach >= 0.0) {
            warn!("Invalid shelfReach {}, using {}", self.shelf_reach, defaults.shelf_reach);
            self.shelf_reach = defaults.shelf_reach;
        }
        self
    }
}

fn try_load<T>(key: &str, current: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value '{raw}': {e}, keeping {current}");
            current
        }),
        Err(_) => {
            info!("{key} not set, using {current}");
            current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let s: NavSettings = serde_json::from_str(r#"{"triggerRadius": 20, "maxZoom": 4}"#).unwrap();
        assert_eq!(s.trigger_radius, 20.0);
        assert_eq!(s.max_zoom, 4.0);
        assert_eq!(s.tick_interval(), Duration::from_millis(500));
        assert_eq!(s.min_zoom, 0.4);
    }

    #[test]
    fn inverted_zoom_bounds_are_swapped() {
        let s: NavSettings = serde_json::from_str(r#"{"minZoom": 3, "maxZoom": 0.4}"#).unwrap();
        let s = s.sanitized();
        assert_eq!((s.min_zoom, s.max_zoom), (0.4, 3.0));
    }

    #[test]
    fn unusable_zoom_values_fall_back_to_defaults() {
        let defaults = NavSettings::default();
        let s = NavSettings { min_zoom: f64::NAN, zoom_step: 0.0, ..NavSettings::default() }.sanitized();
        assert_eq!((s.min_zoom, s.max_zoom), (defaults.min_zoom, defaults.max_zoom));
        assert_eq!(s.zoom_step, defaults.zoom_step);

        let s = NavSettings { max_zoom: -2.0, zoom_step: 0.9, trigger_radius: -1.0, ..NavSettings::default() }
            .sanitized();
        assert_eq!(s.max_zoom, defaults.max_zoom);
        assert_eq!(s.zoom_step, defaults.zoom_step);
        assert_eq!(s.trigger_radius, defaults.trigger_radius);
    }

    #[test]
    fn env_overrides_parse_and_fall_back() {
        // only this test touches these variables
        env::set_var("MMS_TICK_MS", "250");
        env::set_var("MMS_TRIGGER_RADIUS", "not-a-number");
        env::remove_var("MMS_SHELF_REACH");

        let s = NavSettings::default().with_env_overrides();
        assert_eq!(s.tick_interval_ms, 250);
        assert_eq!(s.trigger_radius, 50.0);
        assert_eq!(s.shelf_reach, 4.0);

        env::remove_var("MMS_TICK_MS");
        env::remove_var("MMS_TRIGGER_RADIUS");
    }
}
