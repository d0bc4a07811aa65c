use common_types::{Beacon, Position, Stop, StopKind};
use log::debug;

pub const DESTINATION_LABEL: &str = "Destination";

/// Split a path into beacon check-ins plus the final destination stop.
///
/// Each online beacon becomes a stop at the first path index within
/// `radius` of it. Beacons that never come within `radius` are off-route and
/// dropped. Equal indices keep input order.
pub fn plan_stops(path: &[Position], beacons: &[Beacon], radius: f64) -> Vec<Stop> {
    if path.is_empty() {
        return Vec::new();
    }

    let mut stops: Vec<Stop> = beacons
        .iter()
        .filter(|b| b.is_online())
        .filter_map(|b| {
            let at = b.position();
            let index = path.iter().position(|p| p.distance(&at) <= radius)?;
            Some(Stop { index, name: b.name.clone(), kind: StopKind::Beacon })
        })
        .collect();
    // sort_by_key is stable
    stops.sort_by_key(|s| s.index);

    stops.push(Stop {
        index: path.len() - 1,
        name: DESTINATION_LABEL.to_string(),
        kind: StopKind::Destination,
    });
    debug!("planned {} stops over {} path points", stops.len(), path.len());
    stops
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_types::BeaconStatus;

    fn beacon(name: &str, x: f64, y: f64, status: BeaconStatus) -> Beacon {
        Beacon {
            id: name.to_lowercase(),
            name: name.into(),
            kind: "ble".into(),
            zone_id: None,
            status,
            x,
            y,
        }
    }

    fn line(n: usize) -> Vec<Position> {
        (0..n).map(|i| Position::new(i as f64 * 40.0, 0.0)).collect()
    }

    #[test]
    fn beacon_then_destination() {
        let stops = plan_stops(&line(5), &[beacon("Bakery", 80.0, 0.0, BeaconStatus::Online)], 20.0);
        assert_eq!(
            stops,
            vec![
                Stop { index: 2, name: "Bakery".into(), kind: StopKind::Beacon },
                Stop { index: 4, name: DESTINATION_LABEL.into(), kind: StopKind::Destination },
            ]
        );
    }

    #[test]
    fn offline_and_off_route_beacons_are_dropped() {
        let beacons = [
            beacon("Offline", 40.0, 0.0, BeaconStatus::Offline),
            beacon("Far", 80.0, 500.0, BeaconStatus::Online),
            beacon("Edge", 120.0, 20.0, BeaconStatus::Online),
        ];
        let stops = plan_stops(&line(5), &beacons, 20.0);
        let names: Vec<&str> = stops.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Edge", DESTINATION_LABEL]);
        assert_eq!(stops[0].index, 3);
    }

    #[test]
    fn first_qualifying_index_wins_and_order_is_by_index() {
        // "Wide" touches indices 2..=4 but is reported at 2
        let beacons = [
            beacon("Late", 160.0, 0.0, BeaconStatus::Online),
            beacon("Wide", 120.0, 0.0, BeaconStatus::Online),
            beacon("Twin", 80.0, 30.0, BeaconStatus::Online),
        ];
        let stops = plan_stops(&line(5), &beacons, 45.0);
        let got: Vec<(usize, &str)> = stops.iter().map(|s| (s.index, s.name.as_str())).collect();
        assert_eq!(got, [(2, "Wide"), (2, "Twin"), (3, "Late"), (4, DESTINATION_LABEL)]);
    }

    #[test]
    fn single_point_path_still_has_destination() {
        let stops = plan_stops(&line(1), &[], 20.0);
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].index, 0);
        assert_eq!(stops[0].kind, StopKind::Destination);
    }

    #[test]
    fn destination_is_unique_and_last_even_with_beacon_at_goal() {
        let stops = plan_stops(&line(3), &[beacon("Goal", 80.0, 0.0, BeaconStatus::Online)], 5.0);
        assert_eq!(stops.iter().filter(|s| s.kind == StopKind::Destination).count(), 1);
        assert_eq!(stops.last().unwrap().kind, StopKind::Destination);
        assert_eq!(stops.last().unwrap().index, 2);
        assert_eq!(stops[0].index, 2);
    }
}
