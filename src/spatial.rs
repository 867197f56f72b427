//! Planar distance approximation and nearest-node lookup.
//!
//! Distances use an equirectangular projection around a reference latitude:
//! `dy = Δlat·111320`, `dx = Δlon·111320·cos(lat)`, in metres. This is not a
//! great-circle distance; it is accurate enough at city scale.

use petgraph::graph::NodeIndex;
use rstar::{AABB, PointDistance, RTree, RTreeObject};

use crate::graph::RoadGraph;

/// Metres per degree of latitude.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Equirectangular distance in metres, scaled by `cos(ref_lat)`.
pub fn equirectangular_m(ref_lat: f64, lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let dy = (lat_a - lat_b) * METERS_PER_DEGREE;
    let dx = (lon_a - lon_b) * METERS_PER_DEGREE * ref_lat.to_radians().cos();
    (dx * dx + dy * dy).sqrt()
}

#[derive(Clone)]
struct NodeEntry {
    point: [f64; 2], // [lat, lon]
    node: NodeIndex,
}

impl RTreeObject for NodeEntry {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for NodeEntry {
    /// Squared distance in degree space; only used to seed the search.
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.point[0] - point[0];
        let dlon = self.point[1] - point[1];
        dlat * dlat + dlon * dlon
    }
}

/// Nearest-node index over a graph snapshot.
///
/// Results match a linear scan over nodes in index order that keeps the
/// first strictly-smaller distance: ties go to the lowest `NodeIndex`.
pub struct NodeLocator {
    tree: RTree<NodeEntry>,
}

impl NodeLocator {
    pub fn new(graph: &RoadGraph) -> Self {
        let entries: Vec<NodeEntry> = graph
            .node_indices()
            .filter_map(|ix| {
                let node = graph.node(ix)?;
                (node.lat.is_finite() && node.lon.is_finite())
                    .then_some(NodeEntry { point: [node.lat, node.lon], node: ix })
            })
            .collect();
        Self { tree: RTree::bulk_load(entries) }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Closest node to `(lat, lon)`, or `None` for an empty graph or a
    /// non-finite query.
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<NodeIndex> {
        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }
        let query = [lat, lon];
        let seed = self.tree.nearest_neighbor(&query)?;
        let radius = equirectangular_m(lat, lat, lon, seed.point[0], seed.point[1]);

        let cos = lat.to_radians().cos();
        if cos <= 1e-9 {
            return self.scan(lat, lon, self.tree.iter());
        }

        // Any node that ties or beats the seed lies inside this box.
        let slack = 1.0 + 1e-9;
        let dlat = radius / METERS_PER_DEGREE * slack + 1e-12;
        let dlon = radius / (METERS_PER_DEGREE * cos) * slack + 1e-12;
        let envelope = AABB::from_corners([lat - dlat, lon - dlon], [lat + dlat, lon + dlon]);
        self.scan(lat, lon, self.tree.locate_in_envelope(&envelope))
    }

    fn scan<'a>(
        &self,
        lat: f64,
        lon: f64,
        candidates: impl Iterator<Item = &'a NodeEntry>,
    ) -> Option<NodeIndex> {
        candidates
            .map(|e| (equirectangular_m(lat, lat, lon, e.point[0], e.point[1]), e.node))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, node)| node)
    }
}

/// Reference linear scan over every node.
pub fn nearest_linear(graph: &RoadGraph, lat: f64, lon: f64) -> Option<NodeIndex> {
    let mut best: Option<(f64, NodeIndex)> = None;
    for ix in graph.node_indices() {
        let Some(node) = graph.node(ix) else { continue };
        let d = equirectangular_m(lat, lat, lon, node.lat, node.lon);
        if d.is_nan() {
            continue;
        }
        if best.is_none_or(|(min, _)| d < min) {
            best = Some((d, ix));
        }
    }
    best.map(|(_, ix)| ix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_of(points: &[(f64, f64)]) -> RoadGraph {
        let mut g = RoadGraph::new();
        for (i, &(lat, lon)) in points.iter().enumerate() {
            g.add_node(i as i64, lat, lon);
        }
        g
    }

    #[test]
    fn empty_graph_has_no_nearest_node() {
        let g = RoadGraph::new();
        let locator = NodeLocator::new(&g);
        assert!(locator.is_empty());
        assert_eq!(locator.nearest(11.0, 76.9), None);
        assert_eq!(nearest_linear(&g, 11.0, 76.9), None);
    }

    #[test]
    fn equirectangular_scales_longitude() {
        let d_lat = equirectangular_m(0.0, 0.0, 0.0, 0.001, 0.0);
        assert!((d_lat - 111.32).abs() < 1e-9);
        let d_lon = equirectangular_m(60.0, 60.0, 0.0, 60.0, 0.001);
        assert!((d_lon - 55.66).abs() < 1e-6);
    }

    #[test]
    fn picks_closest_node() {
        let g = graph_of(&[(11.0, 76.0), (11.01, 76.01), (11.02, 76.02)]);
        let locator = NodeLocator::new(&g);
        assert_eq!(locator.nearest(11.011, 76.009), Some(NodeIndex::new(1)));
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        // Nodes 0 and 1 sit on either side of the query, node 2 duplicates 0.
        let g = graph_of(&[(0.25, 0.0), (-0.25, 0.0), (0.25, 0.0)]);
        let locator = NodeLocator::new(&g);
        assert_eq!(locator.nearest(0.0, 0.0), Some(NodeIndex::new(0)));
        assert_eq!(nearest_linear(&g, 0.0, 0.0), Some(NodeIndex::new(0)));
    }

    #[test]
    fn projected_metric_beats_degree_metric() {
        // In raw degrees node 1 is closer; after scaling longitude by
        // cos(60°) node 0 is.
        let g = graph_of(&[(60.0, 10.0018), (60.0012, 10.0)]);
        let locator = NodeLocator::new(&g);
        assert_eq!(nearest_linear(&g, 60.0, 10.0), Some(NodeIndex::new(0)));
        assert_eq!(locator.nearest(60.0, 10.0), Some(NodeIndex::new(0)));
    }

    #[test]
    fn agrees_with_linear_scan_on_a_grid() {
        let mut points = Vec::new();
        for i in 0..12 {
            for j in 0..12 {
                points.push((10.99 + i as f64 * 0.002, 76.95 + j as f64 * 0.003));
            }
        }
        let g = graph_of(&points);
        let locator = NodeLocator::new(&g);
        for k in 0..50 {
            let lat = 10.985 + k as f64 * 0.00071;
            let lon = 76.945 + k as f64 * 0.00093;
            assert_eq!(locator.nearest(lat, lon), nearest_linear(&g, lat, lon), "query {k}");
        }
    }

    #[test]
    fn non_finite_query_returns_none() {
        let g = graph_of(&[(11.0, 76.0)]);
        assert_eq!(NodeLocator::new(&g).nearest(f64::NAN, 76.0), None);
    }
}
