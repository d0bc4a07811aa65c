use std::collections::{hash_map::Entry, HashMap, VecDeque};

use common_types::{Position, Rect, Road, Shelf};
use log::{debug, warn};
use thiserror::Error;

mod overlay;
mod stops;

pub use overlay::{render_route_overlay, OverlayError};
pub use stops::{plan_stops, DESTINATION_LABEL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("floor plan has no roads")]
    NoGraph,

    #[error("no path to the goal")]
    NotFound,
}

/// Neighbor slots in exploration order: up, down, left, right.
const UP: usize = 0;
const DOWN: usize = 1;
const LEFT: usize = 2;
const RIGHT: usize = 3;

#[inline]
fn pack_key(p: Position) -> (u64, u64) {
    // + 0.0 folds -0.0 into 0.0
    ((p.x + 0.0).to_bits(), (p.y + 0.0).to_bits())
}

/// Road-center graph, built once per floor-plan load.
///
/// Nodes live in an arena indexed by road order; every node keeps up to four
/// neighbor indices in fixed direction order so that BFS tie-breaking is
/// reproducible.
#[derive(Debug, Clone)]
pub struct RoadGraph {
    nodes: Vec<Position>,
    rects: Vec<Rect>,
    index: HashMap<(u64, u64), usize>,
    adjacency: Vec<[Option<usize>; 4]>,
}

impl RoadGraph {
    pub fn from_roads(roads: &[Road]) -> Result<Self, RouteError> {
        let first = roads.first().ok_or(RouteError::NoGraph)?;
        let (step_x, step_y) = (first.width, first.height);

        if roads.iter().any(|r| r.width != step_x || r.height != step_y) {
            warn!("roads are not uniform; using {step_x}x{step_y} from road {}", first.id);
        }

        // Overlapping roads with the same center collapse into one node.
        let mut index: HashMap<(u64, u64), usize> = HashMap::with_capacity(roads.len());
        let mut nodes = Vec::with_capacity(roads.len());
        let mut rects = Vec::with_capacity(roads.len());
        for road in roads {
            let c = road.center();
            if let Entry::Vacant(slot) = index.entry(pack_key(c)) {
                slot.insert(nodes.len());
                nodes.push(c);
                rects.push(road.rect());
            }
        }

        let mut adjacency = vec![[None; 4]; nodes.len()];
        let mut edges = 0usize;
        for a in 0..nodes.len() {
            let pa = nodes[a];
            let around = [
                (UP, DOWN, Position::new(pa.x, pa.y - step_y)),
                (DOWN, UP, Position::new(pa.x, pa.y + step_y)),
                (LEFT, RIGHT, Position::new(pa.x - step_x, pa.y)),
                (RIGHT, LEFT, Position::new(pa.x + step_x, pa.y)),
            ];
            for (slot, back, at) in around {
                let Some(&b) = index.get(&pack_key(at)) else { continue };
                let pb = nodes[b];
                let orthogonal = ((pa.x - pb.x).abs() == step_x && pa.y == pb.y)
                    || ((pa.y - pb.y).abs() == step_y && pa.x == pb.x);
                if b == a || !orthogonal || adjacency[a][slot].is_some() {
                    continue;
                }
                adjacency[a][slot] = Some(b);
                adjacency[b][back] = Some(a);
                edges += 1;
            }
        }

        debug!("road graph: {} nodes, {} edges", nodes.len(), edges);
        Ok(Self { nodes, rects, index, adjacency })
    }

    /// Orthogonal neighbors of the road center at `p`, up/down/left/right.
    pub fn neighbors(&self, p: Position) -> Vec<Position> {
        match self.index.get(&pack_key(p)) {
            Some(&i) => self.neighbor_ids(i).map(|j| self.nodes[j]).collect(),
            None => Vec::new(),
        }
    }

    fn neighbor_ids(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency[i].iter().flatten().copied()
    }

    /// Road center nearest to `p`; the first road wins ties.
    pub fn closest_center(&self, p: Position) -> Position {
        self.nodes[self.closest_id(p, 0..self.nodes.len())]
    }

    fn closest_id(&self, p: Position, candidates: impl Iterator<Item = usize>) -> usize {
        let mut best = (0usize, f64::INFINITY);
        for i in candidates {
            let d = self.nodes[i].distance(&p);
            if d < best.1 {
                best = (i, d);
            }
        }
        best.0
    }

    /// Shortest path in hops between the nodes nearest `start` and `goal`.
    /// The first element is the snapped start, not `start` itself.
    pub fn find_path(&self, start: Position, goal: Position) -> Result<Vec<Position>, RouteError> {
        let s = self.closest_id(start, 0..self.nodes.len());
        let g = self.closest_id(goal, 0..self.nodes.len());
        self.bfs(s, g)
    }

    /// Like [`RoadGraph::find_path`], but the goal snaps only onto roads
    /// within `reach` of the shelf rectangle. A shelf with no such road is
    /// unreachable.
    pub fn find_path_to_shelf(
        &self,
        start: Position,
        shelf: &Shelf,
        reach: f64,
    ) -> Result<Vec<Position>, RouteError> {
        let shelf_rect = shelf.rect();
        let front: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.rects[i].gap(&shelf_rect) <= reach)
            .collect();
        if front.is_empty() {
            debug!("shelf {} has no road front within {reach}", shelf.id);
            return Err(RouteError::NotFound);
        }

        let s = self.closest_id(start, 0..self.nodes.len());
        let g = self.closest_id(shelf.center(), front.into_iter());
        self.bfs(s, g)
    }

    pub fn hop_distance(&self, a: Position, b: Position) -> Result<usize, RouteError> {
        self.find_path(a, b).map(|p| p.len() - 1)
    }

    fn bfs(&self, start: usize, goal: usize) -> Result<Vec<Position>, RouteError> {
        let mut came: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut visited = vec![false; self.nodes.len()];
        let mut queue = VecDeque::new();

        visited[start] = true;
        queue.push_back(start);

        while let Some(cur) = queue.pop_front() {
            if cur == goal {
                // reconstruct
                let mut path = vec![self.nodes[cur]];
                let mut at = cur;
                while let Some(prev) = came[at] {
                    path.push(self.nodes[prev]);
                    at = prev;
                }
                path.reverse();
                return Ok(path);
            }
            for next in self.neighbor_ids(cur) {
                if visited[next] {
                    continue;
                }
                visited[next] = true;
                came[next] = Some(cur);
                queue.push_back(next);
            }
        }
        Err(RouteError::NotFound)
    }
}

/// Euclidean length of a polyline.
pub fn polyline_length(pts: &[Position]) -> f64 {
    pts.windows(2).map(|w| w[0].distance(&w[1])).sum()
}

/// SVG `points` attribute for a polyline ("x1,y1 x2,y2 ...").
pub fn polyline_to_svg_points(pts: &[Position]) -> String {
    pts.iter()
        .map(|p| format!("{},{}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ")
}
