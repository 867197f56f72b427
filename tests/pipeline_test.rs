//! End-to-end: score a network, persist it, route over it.

use petgraph::graph::NodeIndex;

use safe_route::graph::{RoadEdge, RoadGraph};
use safe_route::incidents::Incident;
use safe_route::path::{ParallelEdgePolicy, PathFinder};
use safe_route::risk::{RiskCalculator, RiskSettings};
use safe_route::spatial::{NodeLocator, nearest_linear};
use safe_route::store::{GraphStore, LocationMetadata};

const SEGMENT_M: f64 = 1170.0;

/// Start and end joined by a northern and a southern road of equal length
/// and class.
fn two_roads() -> (RoadGraph, [NodeIndex; 4]) {
    let mut g = RoadGraph::new();
    let start = g.add_node(1, 20.000, 80.000);
    let north = g.add_node(2, 20.005, 80.010);
    let south = g.add_node(3, 19.995, 80.010);
    let end = g.add_node(4, 20.000, 80.020);
    for (a, b, name) in [
        (start, north, "North Road"),
        (north, end, "North Road"),
        (start, south, "South Road"),
        (south, end, "South Road"),
    ] {
        let edge = RoadEdge::new(SEGMENT_M).with_highway("primary").with_name(name);
        g.add_edge(a, b, edge.clone());
        g.add_edge(b, a, edge);
    }
    (g, [start, north, south, end])
}

fn noon() -> RiskSettings {
    RiskSettings { hour: Some(12), propagation_iterations: 2 }
}

fn incident_on_north_road() -> Vec<Incident> {
    vec![Incident { lat: 20.0025, lon: 80.005, severity: 0.5, category: "theft".into() }]
}

#[test]
fn incident_steers_route_to_the_quiet_road() {
    let (mut g, [start, north, south, end]) = two_roads();
    let report = RiskCalculator::new(noon(), incident_on_north_road()).run(&mut g).unwrap();

    assert_eq!(report.base_scored, 8);
    assert_eq!(report.incident_adjusted, 2);
    assert_eq!(report.time_multiplier, 0.8);
    assert_eq!(report.propagation_changes.len(), 2);
    assert_eq!(report.nodes_scored, 4);
    assert_eq!(report.skipped, 0);

    let north_risk = g.edge(g.edges_between(start, north)[0]).unwrap().risk.unwrap();
    let south_risk = g.edge(g.edges_between(start, south)[0]).unwrap().risk.unwrap();
    assert!(north_risk > south_risk);

    let finder = PathFinder::new(&g, ParallelEdgePolicy::First);
    let path = finder.find_safest_route(start, end).unwrap();
    assert_eq!(path, vec![start, south, end]);

    let summary = finder.summarize(path);
    assert_eq!(summary.instructions[0].instruction, "Start on South Road");
    assert_eq!(summary.distance_m, 2.0 * SEGMENT_M);
    assert_eq!(summary.distance_km, 2.34);
    assert_eq!(summary.time_min, 3.5);
    assert!(summary.risk > 0.0 && summary.risk < north_risk);
}

#[test]
fn stored_graph_scores_and_routes_the_same() {
    let (mut original, [start, _, _, end]) = two_roads();
    let dir = tempfile::tempdir().unwrap();
    let store = GraphStore::new(dir.path());
    let metadata = LocationMetadata {
        location: "Two Roads".into(),
        nodes: original.node_count(),
        edges: original.edge_count(),
        download_time: chrono::Utc::now(),
        radius: 2000.0,
    };
    store.save("two_roads", &original, &metadata).unwrap();

    let calculator = RiskCalculator::new(noon(), incident_on_north_road());
    let mut loaded = store.load("two_roads").unwrap();
    let first = calculator.run(&mut original).unwrap();
    let second = calculator.run(&mut loaded).unwrap();
    assert_eq!(first, second);

    let a = PathFinder::new(&original, ParallelEdgePolicy::First);
    let b = PathFinder::new(&loaded, ParallelEdgePolicy::First);
    let path_a = a.find_safest_route(start, end).unwrap();
    let path_b = b.find_safest_route(start, end).unwrap();
    assert_eq!(path_a, path_b);
    assert_eq!(a.path_risk(&path_a), b.path_risk(&path_b));
}

#[test]
fn locator_agrees_with_linear_scan() {
    let (g, _) = two_roads();
    let locator = NodeLocator::new(&g);
    for (lat, lon) in [(20.0, 80.0), (20.004, 80.011), (19.9, 80.0), (20.0, 80.01), (21.0, 81.0)] {
        assert_eq!(locator.nearest(lat, lon), nearest_linear(&g, lat, lon), "query ({lat}, {lon})");
    }
}
