use std::ptr::NonNull;

use cordyceps::Linked;
use cordyceps_freetree::{FreeTree, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
struct Block {
    links: Links<Block>,
    size: usize,
}

impl Block {
    fn new(size: usize) -> Box<Block> {
        Box::new(Block {
            links: Links::new(),
            size,
        })
    }
}

unsafe impl Linked<Links<Block>> for Block {
    type Handle = Box<Block>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::from(Box::leak(r))
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<Block>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<Block>> for Block {
    fn size(&self) -> usize {
        self.size
    }
}

fn main() {
    let mut tree: FreeTree<Block> = FreeTree::new();

    let root = tree.insert(Block::new(50));
    for size in [30, 70, 20, 40, 60, 80] {
        tree.insert(Block::new(size));
    }
    tree.assert_invariants();
    println!("{tree:?}");

    let removed = unsafe { tree.remove(root) };
    assert_eq!(removed.size, 50);
    assert!(removed.links.is_unlinked());
    tree.assert_invariants();
    println!("{tree:?}");

    let block = tree.take_best_fit(45).unwrap();
    assert_eq!(block.size, 60);
    tree.assert_invariants();
    println!("{tree:?}");

    drop(tree);
}
