use std::{
    cell::RefCell,
    collections::HashMap,
    rc::{Rc, Weak},
    time::Duration,
};

use common_types::Position;
use pathfinding::polyline_to_svg_points;
use wasm_bindgen::{prelude::*, JsCast};
use web_sys::console;

pub mod error;
pub mod navigator;
pub mod settings;
pub mod store;
pub mod viewport;
pub mod walk;

pub use error::NavError;
pub use navigator::{build_graph, plan_route, Navigator, RoutePlan};
pub use settings::NavSettings;
pub use store::StoreSnapshot;
pub use viewport::Viewport;
pub use walk::{
    ManualScheduler, NavigationSession, Scheduler, SessionId, Tick, TimerHandle, WalkController,
    WalkEvent, WalkState,
};

#[wasm_bindgen(start)]
pub fn start() {
    // Better panic messages in dev builds
    #[cfg(debug_assertions)]
    console_error_panic_hook::set_once();
    console::log_1(&"mapmystore wasm loaded".into());
}

fn js_err(e: NavError) -> JsValue {
    console::warn_1(&JsValue::from_str(&e.to_string()));
    JsValue::from_str(&e.user_message())
}

/// One-shot routing call from JS:
/// - `snapshot` = store JSON `{layout, beacons, products, settings}`
/// - `query` = product id or name
/// - `(x, y)` = shopper position in plan coordinates
///
/// Returns `{ polyline: "x1,y1 x2,y2 ...", path, stops, product, shelf, length }`.
#[wasm_bindgen]
pub fn plan_route_json(snapshot: &str, query: &str, x: f64, y: f64) -> Result<String, JsValue> {
    let snapshot = StoreSnapshot::from_json(snapshot).map_err(js_err)?;
    let graph = build_graph(&snapshot);
    let plan = plan_route(&snapshot, graph.as_ref(), query, Position::new(x, y)).map_err(js_err)?;

    let result = serde_json::json!({
        "polyline": polyline_to_svg_points(&plan.path),
        "route": plan,
    });
    Ok(result.to_string())
}

/// `window.setTimeout`-backed scheduler; each timeout feeds its tick back into
/// the owning navigator and forwards the resulting events to JS.
///
/// The callback closures live in `timeouts` until their timer fires or is
/// cancelled, so a cancelled timer frees its closure.
struct BrowserScheduler {
    target: Weak<RefCell<Navigator<BrowserScheduler>>>,
    on_event: js_sys::Function,
    next: u64,
    timeouts: HashMap<TimerHandle, (i32, Closure<dyn FnMut()>)>,
}

impl BrowserScheduler {
    fn fired(&mut self, timer: TimerHandle) {
        // wasm-bindgen defers freeing a closure that is still running
        self.timeouts.remove(&timer);
    }
}

impl Scheduler for BrowserScheduler {
    fn schedule(&mut self, delay: Duration, session: SessionId) -> TimerHandle {
        self.next += 1;
        let timer = TimerHandle(self.next);
        let Some(window) = web_sys::window() else {
            console::error_1(&"no window: walk timer not armed".into());
            return timer;
        };

        let tick = Tick { session, timer };
        let target = self.target.clone();
        let on_event = self.on_event.clone();
        let callback: Closure<dyn FnMut()> = Closure::once(move || {
            let Some(nav) = target.upgrade() else { return };
            let events = {
                let mut nav = nav.borrow_mut();
                nav.scheduler_mut().fired(timer);
                nav.on_tick(tick)
            };
            emit(&on_event, &events);
        });

        let ms = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        match window.set_timeout_with_callback_and_timeout_and_arguments_0(
            callback.as_ref().unchecked_ref(),
            ms,
        ) {
            Ok(id) => {
                self.timeouts.insert(timer, (id, callback));
            }
            Err(e) => console::error_1(&e),
        }
        timer
    }

    fn cancel(&mut self, timer: TimerHandle) {
        let Some((id, _callback)) = self.timeouts.remove(&timer) else { return };
        if let Some(window) = web_sys::window() {
            window.clear_timeout_with_handle(id);
        }
    }
}

fn emit(on_event: &js_sys::Function, events: &[WalkEvent]) {
    for event in events {
        let payload = match serde_json::to_string(event) {
            Ok(s) => JsValue::from_str(&s),
            Err(e) => {
                console::error_1(&JsValue::from_str(&format!("walk event: {e}")));
                continue;
            }
        };
        if let Err(e) = on_event.call1(&JsValue::NULL, &payload) {
            console::error_1(&e);
        }
    }
}

/// Navigation view for the customer app. Walk events are passed to
/// `on_event` as JSON strings; stop prompts arrive as `stopReached`.
#[wasm_bindgen]
pub struct WasmNavigator {
    inner: Rc<RefCell<Navigator<BrowserScheduler>>>,
    on_event: js_sys::Function,
}

#[wasm_bindgen]
impl WasmNavigator {
    #[wasm_bindgen(constructor)]
    pub fn new(snapshot: &str, on_event: js_sys::Function) -> Result<WasmNavigator, JsValue> {
        let snapshot = StoreSnapshot::from_json(snapshot).map_err(js_err)?;
        let callback = on_event.clone();
        let inner = Rc::new_cyclic(|weak| {
            let scheduler = BrowserScheduler {
                target: weak.clone(),
                on_event: callback,
                next: 0,
                timeouts: HashMap::new(),
            };
            RefCell::new(Navigator::new(snapshot, scheduler))
        });
        Ok(WasmNavigator { inner, on_event })
    }

    /// Plan a route and reset the walk. Returns the route JSON.
    pub fn select_product(&self, query: &str, x: f64, y: f64) -> Result<String, JsValue> {
        let mut nav = self.inner.borrow_mut();
        let plan = nav.select_product(query, Position::new(x, y)).map_err(js_err)?;
        serde_json::to_string(plan).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn move_avatar(&self) -> Result<(), JsValue> {
        let events = self.inner.borrow_mut().start_walk().map_err(js_err)?;
        emit(&self.on_event, &events);
        Ok(())
    }

    pub fn confirm(&self) {
        let events = self.inner.borrow_mut().confirm();
        emit(&self.on_event, &events);
    }

    /// `[x, y]` of the avatar, empty before a route is chosen.
    pub fn avatar(&self) -> Vec<f64> {
        self.inner
            .borrow()
            .avatar()
            .map(|p| vec![p.x, p.y])
            .unwrap_or_default()
    }

    pub fn state(&self) -> String {
        serde_json::to_string(&self.inner.borrow().state()).unwrap_or_default()
    }

    pub fn pan(&self, dx: f64, dy: f64) {
        self.inner.borrow_mut().viewport_mut().pan_by(dx, dy);
    }

    /// Pinch/button zoom by `factor` around `(x, y)`; returns the new scale.
    pub fn zoom_at(&self, x: f64, y: f64, factor: f64) -> f64 {
        self.inner.borrow_mut().viewport_mut().zoom_at(Position::new(x, y), factor)
    }

    /// Wheel zoom around the cursor; returns the new scale.
    pub fn wheel(&self, x: f64, y: f64, delta_y: f64) -> f64 {
        let mut nav = self.inner.borrow_mut();
        let step = nav.snapshot().settings.zoom_step;
        nav.viewport_mut().wheel(Position::new(x, y), delta_y, step)
    }

    pub fn transform(&self) -> String {
        self.inner.borrow().viewport().css_matrix()
    }

    pub fn svg(&self) -> String {
        self.inner.borrow().route_svg()
    }
}
