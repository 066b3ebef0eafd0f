#![no_main]

use aleph_core::dag::{AlephDag, FixedHeads};
use aleph_core::node::{NodeId, NodeStore};
use libfuzzer_sys::fuzz_target;

// Every byte triple adds a node; every node at an even index becomes the
// head of its generation when none is set yet. The order of a view must be
// a prefix of the order of any larger view.
fuzz_target!(|data: &[u8]| {
    let store: NodeStore<u8, usize> = NodeStore::new();
    let mut ids: Vec<NodeId> = (0..4u8).map(|c| store.create_root(c, 0)).collect();
    for chunk in data.chunks_exact(3) {
        let a = ids[usize::from(chunk[1]) % ids.len()];
        let b = ids[usize::from(chunk[2]) % ids.len()];
        if let Ok(id) = store.create_node(chunk[0] % 4, ids.len(), [a, b]) {
            ids.push(id);
        }
    }

    let mut heads = FixedHeads::new();
    for (i, &id) in ids.iter().enumerate() {
        if let Some(generation) = store.generation(id) {
            if i % 2 == 0 && heads.get(generation).is_none() {
                heads.insert(generation, id);
            }
        }
    }

    let half = ids.len() / 2;
    let mut small = AlephDag::new(&store, heads.clone());
    small.add_all(ids[..half].iter().copied());
    let mut large = AlephDag::new(&store, heads);
    large.add_all(ids.iter().copied());

    let small_order = small.order_units();
    let large_order = large.order_units();
    assert!(small_order.is_prefix_of(&large_order));
});
