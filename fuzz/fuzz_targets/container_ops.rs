#![no_main]

use aleph_core::dag::Dag;
use aleph_core::node::{NodeId, NodeStore};
use libfuzzer_sys::fuzz_target;

// Byte layout: the first byte picks the number of roots, the next chunk
// grows the store three bytes per node (creator, parent a, parent b), and
// everything after drives container mutations two bytes at a time.
fuzz_target!(|data: &[u8]| {
    let Some((&root_count, rest)) = data.split_first() else {
        return;
    };
    let store: NodeStore<u8, usize> = NodeStore::new();
    let mut ids: Vec<NodeId> = (0..=usize::from(root_count % 4))
        .map(|i| store.create_root(0, i))
        .collect();

    let split = rest.len() / 2;
    let (shape, ops) = rest.split_at(split - split % 3);
    for chunk in shape.chunks_exact(3) {
        let a = ids[usize::from(chunk[1]) % ids.len()];
        let b = ids[usize::from(chunk[2]) % ids.len()];
        if let Ok(id) = store.create_node(chunk[0] % 5, ids.len(), [a, b]) {
            ids.push(id);
        }
    }

    let mut dag = Dag::new(&store);
    for op in ops.chunks_exact(2) {
        let node = ids[usize::from(op[1]) % ids.len()];
        match op[0] % 6 {
            0 => {
                dag.add(node);
            }
            1 => {
                dag.remove(node);
            }
            2 => dag.intersect_with(dag.ancestors(node)),
            3 => {
                dag.except_with([node]);
            }
            4 => dag.symmetric_except_with([node]),
            _ => {
                dag.union_with(store.ids().take(usize::from(op[1]) % 8));
            }
        }
        assert!(dag.is_consistent());
    }
});
