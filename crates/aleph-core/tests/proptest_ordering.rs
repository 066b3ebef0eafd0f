use std::collections::BTreeMap;

use aleph_core::dag::{AlephDag, FixedHeads};
use aleph_core::node::{Generation, NodeId, NodeStore};
use proptest::prelude::*;

use generators::*;

/// One head per generation, picked by `seed` among that generation's nodes.
fn heads_by_generation(store: &NodeStore<u8, u32>, ids: &[NodeId], seed: usize) -> FixedHeads {
    let mut by_generation: BTreeMap<Generation, Vec<NodeId>> = BTreeMap::new();
    for &id in ids {
        by_generation
            .entry(store.generation(id).unwrap())
            .or_default()
            .push(id);
    }
    by_generation
        .into_iter()
        .map(|(generation, nodes)| (generation, nodes[seed % nodes.len()]))
        .collect()
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    #[test]
    fn order_extends_the_graph(blueprint in arb_blueprint(), seed in any::<usize>()) {
        let store = NodeStore::new();
        let ids = blueprint.build(&store);
        let heads = heads_by_generation(&store, &ids, seed);
        let mut aleph = AlephDag::new(&store, heads);
        aleph.add_all(ids.iter().copied());

        let order = aleph.order_units();
        for &node in order.as_slice() {
            let pos = order.position(node).unwrap();
            for parent in store.parents(node).unwrap() {
                let parent_pos = order.position(parent);
                prop_assert!(parent_pos.is_some(), "{} ordered before its parent {}", node, parent);
                prop_assert!(parent_pos.unwrap() < pos);
            }
        }
    }

    #[test]
    fn order_contains_no_duplicates(blueprint in arb_blueprint(), seed in any::<usize>()) {
        let store = NodeStore::new();
        let ids = blueprint.build(&store);
        let mut aleph = AlephDag::new(&store, heads_by_generation(&store, &ids, seed));
        aleph.add_all(ids.iter().copied());

        let order = aleph.order_units();
        let unique: std::collections::HashSet<_> = order.iter().collect();
        prop_assert_eq!(unique.len(), order.len());
        prop_assert!(order.iter().all(|n| aleph.contains(n)));
    }

    #[test]
    fn growth_is_final(
        blueprint in arb_blueprint(),
        seed in any::<usize>(),
        early in prop::collection::vec(any::<usize>(), 0..6),
    ) {
        let store = NodeStore::new();
        let ids = blueprint.build(&store);
        let heads = heads_by_generation(&store, &ids, seed);

        let mut aleph = AlephDag::new(&store, heads);
        aleph.add_all(resolve(&ids, &early));
        let before = aleph.order_units();
        aleph.add_all(ids.iter().copied());
        let after = aleph.order_units();

        prop_assert!(before.is_prefix_of(&after));
    }

    #[test]
    fn views_with_shared_heads_are_prefix_comparable(
        blueprint in arb_blueprint(),
        seed in any::<usize>(),
        left in prop::collection::vec(any::<usize>(), 0..8),
        right in prop::collection::vec(any::<usize>(), 0..8),
    ) {
        let store = NodeStore::new();
        let ids = blueprint.build(&store);

        let mut a = AlephDag::new(&store, heads_by_generation(&store, &ids, seed));
        a.add_all(resolve(&ids, &left));
        let mut b = AlephDag::new(&store, heads_by_generation(&store, &ids, seed));
        b.add_all(resolve(&ids, &right));

        prop_assert!(a.order_units().is_prefix_comparable(&b.order_units()));
    }

    #[test]
    fn rerun_is_deterministic(blueprint in arb_blueprint(), seed in any::<usize>()) {
        let store = NodeStore::with_tie_break_key([3; 32]);
        let ids = blueprint.build(&store);
        let mut aleph = AlephDag::new(&store, heads_by_generation(&store, &ids, seed));
        aleph.add_all(ids.iter().copied());
        prop_assert_eq!(aleph.order_units(), aleph.order_units());
    }
}
