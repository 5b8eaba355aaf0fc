use rand::{rngs::StdRng, Rng, SeedableRng};
use simstep::{mtree::node::Node, InvariantViolation, MTree, Metric, Point};

#[test]
pub fn covering_radii_hold_after_random_inserts() {
    let mut rng = StdRng::seed_from_u64(0);
    for metric in Metric::ALL {
        for capacity in 2..6 {
            let mut tree = MTree::new(capacity, 40, metric).unwrap();
            for id in 0..150 {
                let point = Point::new(id, vec![rng.gen(), rng.gen(), rng.gen()]);
                tree.insert(point).unwrap();
            }
            assert_eq!(tree.len(), 150);
            assert_eq!(tree.check_covering(), Ok(None), "{metric:?} capacity {capacity}");
        }
    }
}

#[test]
pub fn nodes_respect_capacity() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut tree = MTree::new(3, 20, Metric::L2).unwrap();
    for id in 0..300 {
        tree.insert(Point::new(id, vec![rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)]))
            .unwrap();
    }

    let mut stack = vec![(tree.root(), 1)];
    let mut leaf_depths = Vec::new();
    let mut visited = 0;
    while let Some((id, depth)) = stack.pop() {
        visited += 1;
        let node = tree.node(id).unwrap();
        assert!(!node.is_empty());
        assert!(node.len() <= 3);
        match node {
            Node::Leaf(_) => leaf_depths.push(depth),
            Node::Routing(entries) => stack.extend(entries.iter().map(|e| (e.child, depth + 1))),
        }
    }
    // Balanced: every leaf sits at the bottom level
    assert!(leaf_depths.iter().all(|&d| d == tree.height()));
    assert_eq!(tree.subtree_points(tree.root()).len(), 300);
    assert_eq!(tree.rows().len(), visited);
}

#[test]
pub fn dimension_mismatch_is_reported() {
    let mut tree = MTree::new(2, 4, Metric::L2).unwrap();
    tree.insert(Point::new(0, vec![0.0, 0.0])).unwrap();
    tree.insert(Point::new(1, vec![1.0, 0.0])).unwrap();
    assert!(matches!(
        tree.insert(Point::new(2, vec![1.0])),
        Err(InvariantViolation::Distance(_))
    ));
}
