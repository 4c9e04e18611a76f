extern crate std;

use std::{prelude::v1::*, ptr::NonNull};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

use crate::{FreeTree, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub size: usize,
}

impl TestNode {
    pub fn new(size: usize) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            size,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::from(Box::leak(r))
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    fn size(&self) -> usize {
        self.size
    }
}

/// An operation against the free tree.
///
/// Sizes are kept small so that random sequences produce plenty of equal-size blocks.
#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(u8),
    /// Removes a live block by identity; the index is taken modulo the number of live blocks.
    Remove(usize),
    BestFit(u8),
    TakeBestFit(u8),
    First,
    Last,
    Clear,
}

proptest::prop_compose! {
    fn size_strategy()(
        size in 0u8..32,
    ) -> u8 {
        size
    }
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        4 => size_strategy().prop_map(Op::Insert),
        3 => (0usize..1000).prop_map(Op::Remove),
        1 => size_strategy().prop_map(Op::BestFit),
        2 => size_strategy().prop_map(Op::TakeBestFit),
        1 => Just(Op::First),
        1 => Just(Op::Last),
        1 => Just(Op::Clear),
    ]
}

/// Runs `ops` against a [`FreeTree`] and a sorted list of sizes, asserting that both agree after
/// every operation and that the tree's invariants hold.
pub fn run_model_equivalence(ops: Vec<Op>) {
    let mut sizes: Vec<usize> = Vec::with_capacity(ops.len());
    let mut live: Vec<NonNull<TestNode>> = Vec::with_capacity(ops.len());
    let mut tree: FreeTree<TestNode> = FreeTree::new();

    fn remove_sorted(v: &mut Vec<usize>, value: usize) {
        let idx = v
            .binary_search(&value)
            .expect("model must contain every size in the tree");
        v.remove(idx);
    }

    fn model_best_fit(v: &[usize], size: usize) -> Option<usize> {
        v.get(v.partition_point(|&s| s < size)).copied()
    }

    #[inline]
    fn ref_size(node: &TestNode) -> usize {
        node.size
    }

    for (op_id, op) in ops.into_iter().enumerate() {
        match op {
            Op::Insert(size) => {
                let size = usize::from(size);
                let idx = sizes.partition_point(|&s| s <= size);
                sizes.insert(idx, size);

                live.push(tree.insert(TestNode::new(size)));
            }

            Op::Remove(idx) => {
                if live.is_empty() {
                    continue;
                }

                let ptr = live.swap_remove(idx % live.len());
                let expected = unsafe { ptr.as_ref().size };

                let node = unsafe { tree.remove(ptr) };
                assert_eq!(node.size, expected, "Op #{op_id}: {op:?}");
                assert!(node.links.is_unlinked(), "Op #{op_id}: {op:?}");
                assert!(!unsafe { tree.contains(ptr) }, "Op #{op_id}: {op:?}");

                remove_sorted(&mut sizes, node.size);
            }

            Op::BestFit(size) => {
                let from_model = model_best_fit(&sizes, size.into());
                let from_tree = tree.best_fit(size.into()).map(|n| n.size);

                assert_eq!(from_model, from_tree, "Op #{op_id}: {op:?}");
            }

            Op::TakeBestFit(size) => {
                let from_model = model_best_fit(&sizes, size.into());
                let from_tree = tree.take_best_fit(size.into()).map(|node| {
                    assert!(node.links.is_unlinked(), "Op #{op_id}: {op:?}");

                    let ptr = NonNull::from(&*node);
                    let pos = live
                        .iter()
                        .position(|&p| p == ptr)
                        .expect("removed block must have been live");
                    live.swap_remove(pos);

                    node.size
                });

                assert_eq!(from_model, from_tree, "Op #{op_id}: {op:?}");

                if let Some(size) = from_tree {
                    remove_sorted(&mut sizes, size);
                }
            }

            Op::First => {
                let from_model = sizes.first().copied();
                let from_tree = tree.first().map(|n| n.size);

                assert_eq!(from_model, from_tree, "Op #{op_id}: {op:?}");
            }

            Op::Last => {
                let from_model = sizes.last().copied();
                let from_tree = tree.last().map(|n| n.size);

                assert_eq!(from_model, from_tree, "Op #{op_id}: {op:?}");
            }

            Op::Clear => {
                tree.clear();
                sizes.clear();
                live.clear();
            }
        }

        tree.assert_invariants();
        assert_eq!(sizes.len(), tree.len());
        assert!(sizes.iter().copied().eq(tree.iter().map(ref_size)));

        for &ptr in &live {
            assert!(unsafe { tree.contains(ptr) }, "Op #{op_id}: {op:?}");
        }
    }
}
