//! Guided walk along a planned route.
//!
//! The avatar advances one path point per timer tick and halts at every
//! planned stop until the shopper confirms. Timers come from a [`Scheduler`];
//! every tick carries the session it was armed for plus its own handle, and a
//! tick that does not match the live session's pending handle is dropped.

use std::{collections::VecDeque, time::Duration};

use common_types::{Position, Stop, StopKind};
use log::{debug, info};
use pathfinding::DESTINATION_LABEL;
use serde::Serialize;

use crate::error::NavError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimerHandle(pub u64);

/// Delivered back to [`WalkController::on_tick`] when a scheduled delay ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub session: SessionId,
    pub timer: TimerHandle,
}

pub trait Scheduler {
    /// Arm a one-shot timer. When it fires, the host must pass
    /// `Tick { session, timer: <returned handle> }` to the controller.
    fn schedule(&mut self, delay: Duration, session: SessionId) -> TimerHandle;

    fn cancel(&mut self, timer: TimerHandle);
}

/// Scheduler whose timers only fire when the caller says so.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next: u64,
    pending: VecDeque<(Duration, Tick)>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Remove and return the oldest armed tick.
    pub fn pop(&mut self) -> Option<Tick> {
        self.pending.pop_front().map(|(_, tick)| tick)
    }

    pub fn peek_delay(&self) -> Option<Duration> {
        self.pending.front().map(|(d, _)| *d)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, session: SessionId) -> TimerHandle {
        self.next += 1;
        let timer = TimerHandle(self.next);
        self.pending.push_back((delay, Tick { session, timer }));
        timer
    }

    fn cancel(&mut self, timer: TimerHandle) {
        self.pending.retain(|(_, t)| t.timer != timer);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum WalkState {
    Idle,
    Walking { stop: usize },
    AwaitingConfirmation { stop: usize },
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum WalkEvent {
    #[serde(rename_all = "camelCase")]
    Stepped { path_index: usize, position: Position },
    /// The walk is paused until [`WalkController::confirm`].
    #[serde(rename_all = "camelCase")]
    StopReached { stop_index: usize, stop: Stop },
    #[serde(rename_all = "camelCase")]
    Resumed { stop_index: usize },
    Completed,
}

impl WalkEvent {
    /// Confirmation prompt for the shopper, if this event needs one.
    pub fn prompt(&self) -> Option<String> {
        match self {
            WalkEvent::StopReached { stop, .. } => Some(match stop.kind {
                StopKind::Beacon => format!("You have reached {}. Continue?", stop.name),
                StopKind::Destination => "You have arrived at your destination.".to_string(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Walking,
    Awaiting,
    Completed,
}

/// One in-progress guided walk.
#[derive(Debug, Clone)]
pub struct NavigationSession {
    id: SessionId,
    path: Vec<Position>,
    stops: Vec<Stop>,
    current_path_index: usize,
    current_stop_index: usize,
    phase: Phase,
    pending: Option<TimerHandle>,
}

impl NavigationSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn path(&self) -> &[Position] {
        &self.path
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn current_path_index(&self) -> usize {
        self.current_path_index
    }

    pub fn current_stop_index(&self) -> usize {
        self.current_stop_index
    }

    pub fn avatar(&self) -> Position {
        self.path[self.current_path_index]
    }

    pub fn state(&self) -> WalkState {
        match self.phase {
            Phase::Idle => WalkState::Idle,
            Phase::Walking => WalkState::Walking { stop: self.current_stop_index },
            Phase::Awaiting => WalkState::AwaitingConfirmation { stop: self.current_stop_index },
            Phase::Completed => WalkState::Completed,
        }
    }
}

/// Drives a single [`NavigationSession`]; not reentrant.
pub struct WalkController<S: Scheduler> {
    scheduler: S,
    interval: Duration,
    sessions_started: u64,
    session: Option<NavigationSession>,
}

impl<S: Scheduler> WalkController<S> {
    pub fn new(scheduler: S, interval: Duration) -> Self {
        Self { scheduler, interval, sessions_started: 0, session: None }
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn session(&self) -> Option<&NavigationSession> {
        self.session.as_ref()
    }

    pub fn state(&self) -> WalkState {
        self.session.as_ref().map_or(WalkState::Idle, NavigationSession::state)
    }

    pub fn avatar(&self) -> Option<Position> {
        self.session.as_ref().map(NavigationSession::avatar)
    }

    /// Replace any current session with a new one in `Idle`.
    ///
    /// Beacon stops are clamped onto the path and ordered by index (stable);
    /// any destination stops given are replaced by a single one on the last
    /// point. An empty path only tears the old session down.
    pub fn begin(&mut self, path: Vec<Position>, stops: Vec<Stop>) -> Option<SessionId> {
        self.clear();
        let last = path.len().checked_sub(1)?;

        let mut destination = None;
        let mut stops: Vec<Stop> = stops
            .into_iter()
            .filter_map(|mut stop| match stop.kind {
                StopKind::Destination => {
                    destination.get_or_insert(stop.name);
                    None
                }
                StopKind::Beacon => {
                    stop.index = stop.index.min(last);
                    Some(stop)
                }
            })
            .collect();
        stops.sort_by_key(|s| s.index);
        stops.push(Stop {
            index: last,
            name: destination.unwrap_or_else(|| DESTINATION_LABEL.to_string()),
            kind: StopKind::Destination,
        });

        self.sessions_started += 1;
        let id = SessionId(self.sessions_started);
        info!("session {} ready: {} points, {} stops", id.0, path.len(), stops.len());
        self.session = Some(NavigationSession {
            id,
            path,
            stops,
            current_path_index: 0,
            current_stop_index: 0,
            phase: Phase::Idle,
            pending: None,
        });
        Some(id)
    }

    /// Drop the current session and its pending timer.
    pub fn clear(&mut self) {
        if let Some(old) = self.session.take() {
            if let Some(timer) = old.pending {
                self.scheduler.cancel(timer);
            }
            debug!("session {} discarded", old.id.0);
        }
    }

    /// The "move" command: `Idle` → `Walking(0)`. A no-op once walking.
    pub fn start(&mut self) -> Result<Vec<WalkEvent>, NavError> {
        let session = self.session.as_mut().ok_or(NavError::NoActiveSession)?;
        if session.phase != Phase::Idle {
            debug!("move ignored in {:?}", session.state());
            return Ok(Vec::new());
        }
        info!("session {} walking", session.id.0);
        let mut events = Vec::new();
        self.walk_or_arrive(&mut events);
        Ok(events)
    }

    pub fn on_tick(&mut self, tick: Tick) -> Vec<WalkEvent> {
        let Some(session) = self.session.as_mut() else {
            debug!("tick {:?} with no session", tick.timer);
            return Vec::new();
        };
        if session.id != tick.session || session.pending != Some(tick.timer) {
            debug!("stale tick {:?} for session {}", tick.timer, tick.session.0);
            return Vec::new();
        }
        session.pending = None;
        if session.phase != Phase::Walking {
            return Vec::new();
        }

        if session.current_path_index + 1 < session.path.len() {
            session.current_path_index += 1;
        }
        let mut events = vec![WalkEvent::Stepped {
            path_index: session.current_path_index,
            position: session.avatar(),
        }];
        self.walk_or_arrive(&mut events);
        events
    }

    /// Acknowledge the stop the walk is paused at.
    pub fn confirm(&mut self) -> Vec<WalkEvent> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        if session.phase != Phase::Awaiting {
            return Vec::new();
        }

        let done = session.stops[session.current_stop_index].kind == StopKind::Destination
            || session.current_stop_index + 1 >= session.stops.len();
        if done {
            session.phase = Phase::Completed;
            info!("session {} completed", session.id.0);
            return vec![WalkEvent::Completed];
        }

        session.current_stop_index += 1;
        let mut events = vec![WalkEvent::Resumed { stop_index: session.current_stop_index }];
        self.walk_or_arrive(&mut events);
        events
    }

    /// Either halt at the current target stop or arm the next step.
    fn walk_or_arrive(&mut self, events: &mut Vec<WalkEvent>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let stop = &session.stops[session.current_stop_index];
        if session.current_path_index >= stop.index {
            session.phase = Phase::Awaiting;
            debug!("session {} paused at {}", session.id.0, stop.name);
            events.push(WalkEvent::StopReached {
                stop_index: session.current_stop_index,
                stop: stop.clone(),
            });
        } else {
            session.phase = Phase::Walking;
            session.pending = Some(self.scheduler.schedule(self.interval, session.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> Vec<Position> {
        (0..n).map(|i| Position::new(i as f64 * 40.0, 0.0)).collect()
    }

    fn stops() -> Vec<Stop> {
        vec![
            Stop { index: 2, name: "Bakery".into(), kind: StopKind::Beacon },
            Stop { index: 4, name: DESTINATION_LABEL.into(), kind: StopKind::Destination },
        ]
    }

    fn controller() -> WalkController<ManualScheduler> {
        WalkController::new(ManualScheduler::new(), Duration::from_millis(500))
    }

    /// Fire armed ticks until the walk pauses; returns how many fired.
    fn run_to_pause(c: &mut WalkController<ManualScheduler>) -> usize {
        let mut fired = 0;
        while let Some(tick) = c.scheduler_mut().pop() {
            c.on_tick(tick);
            fired += 1;
        }
        fired
    }

    #[test]
    fn move_without_route_is_no_active_session() {
        let mut c = controller();
        assert!(matches!(c.start(), Err(NavError::NoActiveSession)));
        assert_eq!(c.state(), WalkState::Idle);
    }

    #[test]
    fn walks_stop_by_stop() {
        let mut c = controller();
        c.begin(line(5), stops());
        assert_eq!(c.state(), WalkState::Idle);
        assert_eq!(c.avatar(), Some(Position::new(0.0, 0.0)));

        assert!(c.start().unwrap().is_empty());
        assert_eq!(c.state(), WalkState::Walking { stop: 0 });
        assert_eq!(c.scheduler().peek_delay(), Some(Duration::from_millis(500)));

        assert_eq!(run_to_pause(&mut c), 2);
        assert_eq!(c.state(), WalkState::AwaitingConfirmation { stop: 0 });
        assert_eq!(c.avatar(), Some(Position::new(80.0, 0.0)));

        // nothing armed while paused, and move does not restart stepping
        assert_eq!(c.scheduler().pending(), 0);
        assert!(c.start().unwrap().is_empty());
        assert_eq!(c.scheduler().pending(), 0);

        assert_eq!(c.confirm(), vec![WalkEvent::Resumed { stop_index: 1 }]);
        assert_eq!(c.state(), WalkState::Walking { stop: 1 });
        assert_eq!(run_to_pause(&mut c), 2);
        assert_eq!(c.state(), WalkState::AwaitingConfirmation { stop: 1 });

        assert_eq!(c.confirm(), vec![WalkEvent::Completed]);
        assert_eq!(c.state(), WalkState::Completed);
        assert_eq!(c.avatar(), Some(Position::new(160.0, 0.0)));
        assert!(c.confirm().is_empty());
        assert_eq!(c.scheduler().pending(), 0);
    }

    #[test]
    fn stop_reached_names_the_beacon() {
        let mut c = controller();
        c.begin(line(5), stops());
        c.start().unwrap();
        let first = c.scheduler_mut().pop().unwrap();
        let events = c.on_tick(first);
        assert_eq!(events, vec![WalkEvent::Stepped { path_index: 1, position: Position::new(40.0, 0.0) }]);
        let second = c.scheduler_mut().pop().unwrap();
        let events = c.on_tick(second);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].prompt().as_deref(), Some("You have reached Bakery. Continue?"));
    }

    #[test]
    fn at_most_one_pending_tick() {
        let mut c = controller();
        c.begin(line(5), stops());
        c.start().unwrap();
        c.start().unwrap();
        assert_eq!(c.scheduler().pending(), 1);
        let tick = c.scheduler_mut().pop().unwrap();
        c.on_tick(tick);
        assert_eq!(c.scheduler().pending(), 1);
        // replaying an already-consumed tick does nothing
        assert!(c.on_tick(tick).is_empty());
        assert_eq!(c.session().unwrap().current_path_index(), 1);
    }

    #[test]
    fn new_route_cancels_old_walk() {
        let mut c = controller();
        let old = c.begin(line(5), stops()).unwrap();
        c.start().unwrap();
        let first = c.scheduler_mut().pop().unwrap();
        c.on_tick(first);
        assert_eq!(c.scheduler().pending(), 1);
        let stale = c.scheduler().pending[0].1;

        let new = c.begin(line(3), vec![]).unwrap();
        assert_ne!(old, new);
        assert_eq!(c.scheduler().pending(), 0);
        assert_eq!(c.state(), WalkState::Idle);

        // the superseded timer fires late: no ghost step
        assert!(c.on_tick(stale).is_empty());
        assert_eq!(c.session().unwrap().current_path_index(), 0);
        assert_eq!(c.avatar(), Some(Position::new(0.0, 0.0)));
    }

    #[test]
    fn single_point_route_arrives_immediately() {
        let mut c = controller();
        c.begin(line(1), vec![Stop { index: 0, name: DESTINATION_LABEL.into(), kind: StopKind::Destination }]);
        let events = c.start().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].prompt().as_deref(), Some("You have arrived at your destination."));
        assert_eq!(c.scheduler().pending(), 0);
        assert_eq!(c.confirm(), vec![WalkEvent::Completed]);
    }

    #[test]
    fn shared_index_stops_pause_twice_without_stepping() {
        let mut c = controller();
        let stops = vec![
            Stop { index: 1, name: "A".into(), kind: StopKind::Beacon },
            Stop { index: 1, name: "B".into(), kind: StopKind::Beacon },
            Stop { index: 2, name: DESTINATION_LABEL.into(), kind: StopKind::Destination },
        ];
        c.begin(line(3), stops);
        c.start().unwrap();
        assert_eq!(run_to_pause(&mut c), 1);
        let events = c.confirm();
        assert!(matches!(events.last(), Some(WalkEvent::StopReached { stop_index: 1, .. })));
        assert_eq!(c.scheduler().pending(), 0);
        c.confirm();
        assert_eq!(run_to_pause(&mut c), 1);
        assert_eq!(c.state(), WalkState::AwaitingConfirmation { stop: 2 });
    }

    #[test]
    fn missing_destination_is_appended_and_indices_clamped() {
        let mut c = controller();
        c.begin(line(3), vec![Stop { index: 9, name: "Far".into(), kind: StopKind::Beacon }]);
        let s = c.session().unwrap();
        assert_eq!(s.stops().len(), 2);
        assert_eq!(s.stops()[0].index, 2);
        assert_eq!(s.stops()[1].kind, StopKind::Destination);
    }

    #[test]
    fn misplaced_destination_is_moved_to_the_end() {
        let mut c = controller();
        c.begin(
            line(5),
            vec![
                Stop { index: 4, name: DESTINATION_LABEL.into(), kind: StopKind::Destination },
                Stop { index: 3, name: "Dairy".into(), kind: StopKind::Beacon },
                Stop { index: 2, name: "Bakery".into(), kind: StopKind::Beacon },
                Stop { index: 1, name: DESTINATION_LABEL.into(), kind: StopKind::Destination },
            ],
        );
        let shape: Vec<(usize, StopKind)> =
            c.session().unwrap().stops().iter().map(|s| (s.index, s.kind)).collect();
        assert_eq!(
            shape,
            [(2, StopKind::Beacon), (3, StopKind::Beacon), (4, StopKind::Destination)]
        );

        // both beacons are visited before the walk can complete
        c.start().unwrap();
        run_to_pause(&mut c);
        assert_eq!(c.state(), WalkState::AwaitingConfirmation { stop: 0 });
        c.confirm();
        run_to_pause(&mut c);
        assert_eq!(c.state(), WalkState::AwaitingConfirmation { stop: 1 });
        c.confirm();
        run_to_pause(&mut c);
        assert_eq!(c.confirm(), vec![WalkEvent::Completed]);
    }

    #[test]
    fn empty_path_clears_session() {
        let mut c = controller();
        c.begin(line(4), stops());
        assert!(c.begin(Vec::new(), stops()).is_none());
        assert!(c.session().is_none());
        assert!(matches!(c.start(), Err(NavError::NoActiveSession)));
    }

    #[test]
    fn events_serialize_for_the_browser() {
        let ev = WalkEvent::Stepped { path_index: 3, position: Position::new(1.0, 2.0) };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "stepped");
        assert_eq!(v["pathIndex"], 3);
        let st = serde_json::to_value(WalkState::AwaitingConfirmation { stop: 1 }).unwrap();
        assert_eq!(st["state"], "awaitingConfirmation");
    }
}
