use common_types::{Beacon, FloorPlan, Product, Shelf};
use log::debug;
use serde::{Deserialize, Serialize};
use svg_tools::parse_floor_plan_svg;

use crate::{error::NavError, settings::NavSettings};

/// Everything the navigator needs from the layout, beacon and product
/// stores, captured at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub layout: Option<FloorPlan>,
    #[serde(default)]
    pub beacons: Vec<Beacon>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub settings: NavSettings,
}

impl StoreSnapshot {
    pub fn from_json(data: &str) -> Result<Self, NavError> {
        let mut snapshot: Self = serde_json::from_str(data)?;
        snapshot.settings = snapshot.settings.sanitized();
        Ok(snapshot)
    }

    pub fn layout(&self) -> Result<&FloorPlan, NavError> {
        self.layout.as_ref().ok_or(NavError::NavigationUnavailable)
    }

    /// Replace the layout with one read from floor-plan SVG markup.
    /// The current layout is kept when the markup does not parse.
    pub fn load_layout_svg(&mut self, svg: &str) -> Result<&FloorPlan, NavError> {
        let plan = parse_floor_plan_svg(svg)?;
        if let Some(old) = &self.layout {
            debug!(
                "replacing layout ({} roads, {} shelves) with SVG layout ({} roads, {} shelves)",
                old.roads.len(),
                old.shelves.len(),
                plan.roads.len(),
                plan.shelves.len()
            );
        }
        Ok(self.layout.insert(plan))
    }

    /// Exact id first, then a case-insensitive name match.
    pub fn find_product(&self, query: &str) -> Option<&Product> {
        let q = query.trim();
        if q.is_empty() {
            return None;
        }
        if let Some(p) = self.products.iter().find(|p| p.id == q) {
            return Some(p);
        }
        let needle = q.to_lowercase();
        self.products
            .iter()
            .find(|p| p.name.to_lowercase() == needle)
            .or_else(|| self.products.iter().find(|p| p.name.to_lowercase().contains(&needle)))
    }

    /// First shelf holding a positive quantity of the product.
    pub fn shelf_for_product(&self, product_id: &str) -> Option<&Shelf> {
        self.layout
            .as_ref()?
            .shelves
            .iter()
            .find(|s| s.stocks(product_id))
    }

    pub fn locate(&self, query: &str) -> Result<(&Product, &Shelf), NavError> {
        let unavailable = || NavError::ProductUnavailable(query.trim().to_string());
        let product = self.find_product(query).ok_or_else(unavailable)?;
        let shelf = self.shelf_for_product(&product.id).ok_or_else(unavailable)?;
        Ok((product, shelf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "layout": {
            "roads": [{"id": "r1", "x": 0, "y": 0, "width": 40, "height": 40}],
            "shelves": [
                {"id": "s1", "label": "Bread", "x": 0, "y": 40, "width": 40, "height": 20,
                 "products": [{"productId": "p1", "qty": 0}]},
                {"id": "s2", "label": "Bread 2", "x": 40, "y": 40, "width": 40, "height": 20,
                 "products": [{"productId": "p1", "qty": 4}]}
            ]
        },
        "beacons": [
            {"id": "b1", "name": "Door", "type": "ble", "zoneId": null, "status": "online", "x": 0, "y": 0},
            {"id": "b2", "name": "Back", "type": "ble", "status": "offline", "x": 9, "y": 9}
        ],
        "products": [
            {"id": "p1", "name": "Sourdough Loaf", "category": "bakery", "price": 4.5},
            {"id": "p2", "name": "Sourdough Starter"},
            {"id": "p3", "name": "Rye"}
        ]
    }"#;

    #[test]
    fn locate_skips_empty_shelves() {
        let snap = StoreSnapshot::from_json(SNAPSHOT).unwrap();
        let (product, shelf) = snap.locate("sourdough loaf").unwrap();
        assert_eq!(product.id, "p1");
        assert_eq!(shelf.id, "s2");
    }

    #[test]
    fn id_beats_name_and_partial_names_match() {
        let snap = StoreSnapshot::from_json(SNAPSHOT).unwrap();
        assert_eq!(snap.find_product("p3").unwrap().name, "Rye");
        assert_eq!(snap.find_product("STARTER").unwrap().id, "p2");
        assert!(snap.find_product("   ").is_none());
    }

    #[test]
    fn unstocked_product_is_unavailable() {
        let snap = StoreSnapshot::from_json(SNAPSHOT).unwrap();
        let err = snap.locate("Rye").unwrap_err();
        assert!(matches!(err, NavError::ProductUnavailable(ref q) if q == "Rye"));
        assert!(matches!(snap.locate("caviar"), Err(NavError::ProductUnavailable(_))));
    }

    #[test]
    fn statuses_and_default_settings() {
        let snap = StoreSnapshot::from_json(SNAPSHOT).unwrap();
        let online: Vec<bool> = snap.beacons.iter().map(Beacon::is_online).collect();
        assert_eq!(online, [true, false]);
        assert_eq!(snap.settings, NavSettings::default());
    }

    #[test]
    fn svg_layout_replaces_json_layout() {
        let mut snap = StoreSnapshot::from_json(SNAPSHOT).unwrap();
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100">
            <rect class="road" id="a" x="0" y="0" width="20" height="20"/>
            <rect class="road" id="b" x="20" y="0" width="20" height="20"/>
            <rect class="shelf" id="rye-shelf" x="20" y="20" width="20" height="10"
                  data-label="Rye" data-products="p3:2"/>
        </svg>"#;
        let plan = snap.load_layout_svg(svg).unwrap();
        assert_eq!(plan.roads.len(), 2);
        let (product, shelf) = snap.locate("rye").unwrap();
        assert_eq!((product.id.as_str(), shelf.id.as_str()), ("p3", "rye-shelf"));

        assert!(matches!(snap.load_layout_svg("<svg"), Err(NavError::Svg(_))));
        assert_eq!(snap.layout().unwrap().roads.len(), 2);
    }

    #[test]
    fn missing_layout_is_navigation_unavailable() {
        let snap = StoreSnapshot::from_json(r#"{"products": []}"#).unwrap();
        assert!(matches!(snap.layout(), Err(NavError::NavigationUnavailable)));
        assert!(matches!(StoreSnapshot::from_json("{"), Err(NavError::InvalidSnapshot(_))));
    }
}
