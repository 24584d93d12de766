use proptest::prelude::*;

use triangle_selector::graph::generators::{
    erdos_renyi_graph, kronecker_graph, KronMode, KroneckerSpec,
};
use triangle_selector::runtime::World;
use triangle_selector::{count_triangles, triangle_count, Graph, TcConfig, TcError};

fn count(graph: &Graph, num_workers: usize, chunk_size: usize) -> i64 {
    count_triangles(graph, &TcConfig::new(num_workers, chunk_size).unwrap())
        .unwrap()
        .triangles
}

#[test]
fn four_vertex_graph_has_one_triangle() {
    let graph = Graph::from_edges(4, vec![(0, 1), (0, 2), (1, 2), (2, 3)]).unwrap();
    for num_workers in [1, 2, 4, 8] {
        assert_eq!(count(&graph, num_workers, 64), 1);
    }
}

#[test]
fn kronecker_center_loop_matches_closed_form() {
    let spec: KroneckerSpec = "1 2 2".parse().unwrap();
    let graph = kronecker_graph(&spec).unwrap();
    assert_eq!(spec.expected_triangles(), 4);
    assert_eq!(graph.brute_force_triangles(), 4);
    for num_workers in [1, 2, 4, 8] {
        assert_eq!(count(&graph, num_workers, 64), 4);
    }
}

#[test]
fn kronecker_modes_on_larger_products() {
    for (mode, stars) in [
        (KronMode::CenterLoop, vec![3, 4, 5]),
        (KronMode::LeafLoop, vec![3, 4, 5]),
        (KronMode::NoLoops, vec![3, 4, 5]),
    ] {
        let spec = KroneckerSpec::new(mode, stars).unwrap();
        let graph = kronecker_graph(&spec).unwrap();
        let expected = spec.expected_triangles() as i64;
        for num_workers in [1, 3, 4] {
            assert_eq!(
                count(&graph, num_workers, 16),
                expected,
                "{spec:?} on {num_workers}"
            );
        }
    }
}

#[test]
fn worker_count_and_chunk_size_do_not_change_the_count() {
    let graph = erdos_renyi_graph(120, 0.15, 99).unwrap();
    let expected = graph.brute_force_triangles() as i64;
    assert!(expected > 0);
    let widest = graph.rows().map(|r| r.len()).max().unwrap();
    for num_workers in [1, 2, 4, 8] {
        for chunk_size in [1, 64, widest] {
            assert_eq!(count(&graph, num_workers, chunk_size), expected);
        }
    }
}

#[test]
fn zero_edge_graph() {
    let graph = Graph::from_rows(vec![vec![]; 10]).unwrap();
    let run = count_triangles(&graph, &TcConfig::new(4, 64).unwrap()).unwrap();
    assert_eq!(run.triangles, 0);
    assert_eq!(run.packets_sent, 0);
}

#[test]
fn more_workers_than_vertices() {
    let graph = Graph::from_edges(3, vec![(0, 1), (1, 2), (0, 2)]).unwrap();
    assert_eq!(count(&graph, 8, 64), 1);
}

#[test]
fn repeated_runs_reset_the_count() {
    let graph = erdos_renyi_graph(60, 0.2, 3).unwrap();
    let expected = graph.brute_force_triangles() as i64;
    let parts = graph.partition(4).unwrap();
    let counts = World::run(4, |ctx| {
        let rows = &parts[ctx.rank()];
        (0..3)
            .map(|_| triangle_count(ctx, rows, 8).map(|run| run.triangles))
            .collect::<Result<Vec<_>, _>>()
    })
    .unwrap();
    for per_worker in counts {
        assert_eq!(per_worker, vec![expected; 3]);
    }
}

#[test]
fn every_worker_sees_the_same_totals() {
    let graph = erdos_renyi_graph(80, 0.1, 11).unwrap();
    let parts = graph.partition(4).unwrap();
    let runs = World::run(4, |ctx| triangle_count(ctx, &parts[ctx.rank()], 64)).unwrap();
    let local_sum: i64 = runs.iter().map(|r| r.local_count).sum();
    for run in &runs {
        assert_eq!(run.triangles, local_sum);
        assert_eq!(run.packets_sent, run.packets_processed);
        assert_eq!(run.packets_sent, runs[0].packets_sent);
    }
    assert_eq!(local_sum, graph.brute_force_triangles() as i64);
}

#[test]
fn mismatched_partition_is_rejected() {
    let graph = Graph::from_edges(4, vec![(0, 1), (0, 2), (1, 2)]).unwrap();
    let parts = graph.partition(3).unwrap();
    // only rank 2 is handed the wrong rows; the others must not hang
    let result = World::run(3, |ctx| {
        let rank = if ctx.rank() == 2 { 0 } else { ctx.rank() };
        triangle_count(ctx, &parts[rank], 64)
    });
    assert!(matches!(result, Err(TcError::InvalidConfig(_))));
}

#[test]
fn invalid_configs_are_rejected() {
    let graph = Graph::from_rows(vec![vec![]; 2]).unwrap();
    assert!(TcConfig::new(0, 64).is_err());
    let zero_chunks = TcConfig {
        num_workers: 2,
        chunk_size: 0,
    };
    assert!(count_triangles(&graph, &zero_chunks).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn random_graphs_match_brute_force(
        num_vertices in 0usize..40,
        prob in 0.0f64..0.6,
        seed in any::<u64>(),
        num_workers in 1usize..6,
        chunk_size in 1usize..10,
    ) {
        let graph = erdos_renyi_graph(num_vertices, prob, seed).unwrap();
        let expected = graph.brute_force_triangles() as i64;
        prop_assert_eq!(count(&graph, num_workers, chunk_size), expected);
    }
}
