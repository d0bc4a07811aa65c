use common_types::{Position, Product, Shelf, Stop};
use log::{info, warn};
use pathfinding::{plan_stops, polyline_length, render_route_overlay, RoadGraph, RouteError};
use serde::Serialize;
use svg_tools::{extract_viewbox, floor_plan_to_svg, rasterize_svg_to_png_bytes};

use crate::{
    error::NavError,
    store::StoreSnapshot,
    viewport::Viewport,
    walk::{Scheduler, SessionId, Tick, WalkController, WalkEvent, WalkState},
};

/// A resolved product search: where it is and how to get there.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlan {
    pub product: Product,
    pub shelf: Shelf,
    pub path: Vec<Position>,
    pub stops: Vec<Stop>,
    pub length: f64,
}

/// Resolve `query` to a shelf and route there from `start`.
///
/// Product availability is checked before any path search.
pub fn plan_route(
    snapshot: &StoreSnapshot,
    graph: Option<&RoadGraph>,
    query: &str,
    start: Position,
) -> Result<RoutePlan, NavError> {
    snapshot.layout()?;
    let (product, shelf) = snapshot.locate(query)?;
    let graph = graph.ok_or(RouteError::NoGraph)?;

    let settings = &snapshot.settings;
    let path = graph.find_path_to_shelf(start, shelf, settings.shelf_reach)?;
    let stops = plan_stops(&path, &snapshot.beacons, settings.trigger_radius);

    Ok(RoutePlan {
        product: product.clone(),
        shelf: shelf.clone(),
        length: polyline_length(&path),
        path,
        stops,
    })
}

/// Build the road graph for a snapshot, `None` when it has nothing to route on.
pub fn build_graph(snapshot: &StoreSnapshot) -> Option<RoadGraph> {
    let layout = snapshot.layout.as_ref()?;
    match RoadGraph::from_roads(&layout.roads) {
        Ok(graph) => Some(graph),
        Err(e) => {
            warn!("navigation unavailable: {e}");
            None
        }
    }
}

/// One shopper's navigation view: store snapshot, current route, guided walk
/// and map viewport.
pub struct Navigator<S: Scheduler> {
    snapshot: StoreSnapshot,
    graph: Option<RoadGraph>,
    walk: WalkController<S>,
    viewport: Viewport,
    route: Option<(SessionId, RoutePlan)>,
}

impl<S: Scheduler> Navigator<S> {
    pub fn new(snapshot: StoreSnapshot, scheduler: S) -> Self {
        let graph = build_graph(&snapshot);
        let walk = WalkController::new(scheduler, snapshot.settings.tick_interval());
        let viewport = Viewport::from_settings(&snapshot.settings);
        Self { snapshot, graph, walk, viewport, route: None }
    }

    pub fn snapshot(&self) -> &StoreSnapshot {
        &self.snapshot
    }

    pub fn is_available(&self) -> bool {
        self.graph.is_some()
    }

    /// Plan a route to `query` and start a fresh session in `Idle`.
    /// On error the current session is left as it was.
    pub fn select_product(&mut self, query: &str, start: Position) -> Result<&RoutePlan, NavError> {
        let plan = plan_route(&self.snapshot, self.graph.as_ref(), query, start)?;
        info!(
            "routing to {} on shelf {}: {} steps, {} stops",
            plan.product.name,
            plan.shelf.id,
            plan.path.len() - 1,
            plan.stops.len()
        );
        let Some(session) = self.walk.begin(plan.path.clone(), plan.stops.clone()) else {
            return Err(RouteError::NotFound.into());
        };
        let (_, plan) = self.route.insert((session, plan));
        Ok(plan)
    }

    pub fn route(&self) -> Option<&RoutePlan> {
        self.route.as_ref().map(|(_, plan)| plan)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.route.as_ref().map(|(id, _)| *id)
    }

    pub fn start_walk(&mut self) -> Result<Vec<WalkEvent>, NavError> {
        self.walk.start()
    }

    pub fn on_tick(&mut self, tick: Tick) -> Vec<WalkEvent> {
        self.walk.on_tick(tick)
    }

    pub fn confirm(&mut self) -> Vec<WalkEvent> {
        self.walk.confirm()
    }

    pub fn state(&self) -> WalkState {
        self.walk.state()
    }

    pub fn avatar(&self) -> Option<Position> {
        self.walk.avatar()
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        self.walk.scheduler_mut()
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    /// The store map with the current route drawn on it.
    pub fn route_svg(&self) -> String {
        let layout = self.snapshot.layout.clone().unwrap_or_default();
        let route = self.route().map(|r| r.path.as_slice());
        floor_plan_to_svg(&layout, &self.snapshot.beacons, route)
    }

    /// Rasterized map with the route, stops and start marker painted on.
    pub fn route_png(&self) -> Result<Vec<u8>, NavError> {
        let layout = self.snapshot.layout()?;
        let svg = floor_plan_to_svg(layout, &self.snapshot.beacons, None);
        // pixel (0,0) of the raster is the viewBox origin
        let vb = extract_viewbox(&svg)?;
        let (png, _, _) = rasterize_svg_to_png_bytes(&svg)?;
        let (path, stops) = match self.route() {
            Some(r) => (r.path.as_slice(), r.stops.as_slice()),
            None => (&[][..], &[][..]),
        };
        Ok(render_route_overlay(&png, Position::new(vb.x, vb.y), path, stops)?)
    }
}
