//! An intrusive, size-keyed binary search tree for indexing free memory blocks.
#![no_std]

// Ordering rules:
// - Every node in the left subtree of `x` has a size less than or equal to `size(x)`.
// - Every node in the right subtree of `x` has a size strictly greater than `size(x)`.
//
// Equal sizes therefore always descend to the left. Blocks sharing a size form a chain along the
// left spine below the first block of that size, and a block can be found by identity by
// following the same rule the inserter used: go left on ties until the block itself is reached.
//
// The tree is deliberately unbalanced. An allocator that frees blocks in monotonic size order will
// build a chain; every walk is O(height), and nothing in the mutating paths recurses deeper than
// one level, so a chain costs time but not stack.

use core::{
    cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomPinned, mem, pin::Pin, ptr,
    ptr::NonNull,
};

use cordyceps::Linked;

#[cfg(any(test, feature = "std"))]
extern crate std;

#[cfg(any(test, feature = "std"))]
mod debug;
mod iter;
#[cfg(any(test, feature = "model"))]
pub mod model;

pub use iter::Iter;

/// A free block that can be linked into a [`FreeTree`].
pub trait TreeNode<L>: Linked<L> {
    /// The size of the block. This is the ordering key of the tree.
    ///
    /// The value must not change while the block is linked into a tree.
    fn size(&self) -> usize;
}

/// An intrusive binary search tree of free blocks, ordered by size.
///
/// Blocks of equal size are kept on a left-leaning chain, so any particular block can be
/// located (and removed) by identity even when its size is shared with other blocks.
pub struct FreeTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    len: usize,
}

/// The links embedded in each block of a [`FreeTree`].
pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    children: [Link<T>; 2],
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

/// A pointer to the cell holding a link: either the tree root or a child slot of some node.
type Slot<T> = NonNull<Link<T>>;

impl<T> FreeTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> FreeTree<T> {
        FreeTree { root: None, len: 0 }
    }

    /// Returns `true` if the tree contains no blocks.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of blocks in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns an iterator over the blocks of the tree, in order of non-decreasing size.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        let mut count = 0;

        if let Some(root) = self.root {
            unsafe { self.assert_invariants_at(root, None, None, &mut count) };
        }

        assert_eq!(count, self.len, "reachable blocks must match the tree length");
    }

    // Checks the subtree at `node`, whose sizes must lie in `(lower, upper]`.
    unsafe fn assert_invariants_at(
        &self,
        node: NonNull<T>,
        lower: Option<usize>,
        upper: Option<usize>,
        count: &mut usize,
    ) {
        *count += 1;

        // A cycle would otherwise recurse forever.
        assert!(*count <= self.len, "tree contains more blocks than its length");

        unsafe {
            let size = node.as_ref().size();

            if let Some(lower) = lower {
                assert!(size > lower, "block of size {size} must be greater than {lower}");
            }

            if let Some(upper) = upper {
                assert!(size <= upper, "block of size {size} must be at most {upper}");
            }

            let left = T::links(node).as_ref().left();
            let right = T::links(node).as_ref().right();

            assert_ne!(left, Some(node), "block must not be its own left child");
            assert_ne!(right, Some(node), "block must not be its own right child");

            if let Some(left) = left {
                self.assert_invariants_at(left, lower, Some(size), count);
            }

            if let Some(right) = right {
                self.assert_invariants_at(right, Some(size), upper, count);
            }
        }
    }

    /// Returns the smallest block in the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        let root = self.root?;

        unsafe {
            let first = Self::min_in_subtree(root);
            Some(Pin::new_unchecked(first.as_ref()))
        }
    }

    /// Returns the largest block in the tree.
    pub fn last(&self) -> Option<Pin<&T>> {
        let mut cur = self.root?;

        unsafe {
            while let Some(right) = T::links(cur).as_ref().right() {
                cur = right;
            }

            Some(Pin::new_unchecked(cur.as_ref()))
        }
    }

    /// Returns the smallest block whose size is at least `size`.
    ///
    /// Among several blocks of the best size, the one deepest on their duplicate chain is
    /// returned.
    pub fn best_fit(&self, size: usize) -> Option<Pin<&T>> {
        let ptr = self.best_fit_raw(size)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    fn best_fit_raw(&self, size: usize) -> Link<T> {
        let mut opt_cur = self.root;
        let mut best = None;

        while let Some(cur) = opt_cur {
            unsafe {
                if cur.as_ref().size() >= size {
                    best = Some(cur);
                    opt_cur = T::links(cur).as_ref().left();
                } else {
                    opt_cur = T::links(cur).as_ref().right();
                }
            }
        }

        best
    }

    /// Removes and returns the smallest block whose size is at least `size`.
    ///
    /// Returns `None`, leaving the tree untouched, if no block is large enough.
    pub fn take_best_fit(&mut self, size: usize) -> Option<T::Handle> {
        let Some(node) = self.best_fit_raw(size) else {
            log::trace!("no free block fits a request of size {size}");
            return None;
        };

        // SAFETY: `node` was just found in this tree.
        unsafe { Some(self.remove(node)) }
    }

    /// Returns `true` if `node` is linked into this tree.
    ///
    /// # Safety
    ///
    /// `node` must point to a live block, though it need not be an element of this tree.
    pub unsafe fn contains(&self, node: NonNull<T>) -> bool {
        let mut root = self.root;

        // The search only reads through the slot, so a copy of the root is enough.
        unsafe { (*Self::find_slot(NonNull::from(&mut root), node).as_ptr()).is_some() }
    }

    /// Returns the in-order predecessor of `node` within its subtree: the largest block of its
    /// left subtree.
    ///
    /// Returns `None` if `node` has no left child.
    pub fn predecessor(&self, node: Pin<&T>) -> Option<Pin<&T>> {
        let ptr = NonNull::from(node.get_ref());

        unsafe {
            let pred = Self::predecessor_raw(ptr)?;
            Some(Pin::new_unchecked(pred.as_ref()))
        }
    }

    unsafe fn predecessor_raw(node: NonNull<T>) -> Link<T> {
        unsafe {
            let mut cur = T::links(node).as_ref().left()?;

            while let Some(right) = T::links(cur).as_ref().right() {
                cur = right;
            }

            Some(cur)
        }
    }

    // Returns the next block in size order after `node`, which must be an element of this tree.
    pub(crate) unsafe fn successor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe {
            if let Some(right) = T::links(node).as_ref().right() {
                return Some(Self::min_in_subtree(right));
            }

            // Without parent links, retrace the path from the root. The successor is the last
            // block on that path where the search turned left.
            let size = node.as_ref().size();
            let mut opt_cur = self.root;
            let mut successor = None;

            while let Some(cur) = opt_cur {
                if cur == node {
                    break;
                }

                if size <= cur.as_ref().size() {
                    successor = Some(cur);
                    opt_cur = T::links(cur).as_ref().left();
                } else {
                    opt_cur = T::links(cur).as_ref().right();
                }
            }

            successor
        }
    }

    // Returns the minimum block in the subtree.
    #[inline]
    unsafe fn min_in_subtree(root: NonNull<T>) -> NonNull<T> {
        let mut cur = root;

        while let Some(left) = unsafe { T::links(cur).as_ref().left() } {
            cur = left;
        }

        cur
    }

    // Returns the slot holding `target`, starting the search at the slot `root`.
    //
    // If `target` is not reachable from `root`, the returned slot is empty.
    unsafe fn find_slot(root: Slot<T>, target: NonNull<T>) -> Slot<T> {
        let mut slot = root;

        unsafe {
            let size = target.as_ref().size();

            while let Some(cur) = *slot.as_ptr() {
                if cur == target {
                    break;
                }

                // Ties go left: a block sharing `cur`'s size can only be in its left subtree.
                let dir = match size.cmp(&cur.as_ref().size()) {
                    Ordering::Less | Ordering::Equal => Dir::Left,
                    Ordering::Greater => Dir::Right,
                };

                slot = Links::child_slot(T::links(cur), dir);
            }
        }

        slot
    }

    /// Inserts a free block into the tree, returning a pointer that identifies it.
    ///
    /// Blocks of a size already present are placed below the existing ones on the left chain.
    ///
    /// This operation completes in _O(height)_ time.
    pub fn insert(&mut self, item: T::Handle) -> NonNull<T> {
        let ptr = T::into_ptr(item);

        unsafe {
            debug_assert!(
                T::links(ptr).as_ref().is_unlinked(),
                "inserted block must not have children"
            );

            let size = ptr.as_ref().size();
            let mut slot = NonNull::from(&mut self.root);

            // Descend the tree, looking for an empty slot.
            while let Some(cur) = *slot.as_ptr() {
                let dir = if size <= cur.as_ref().size() {
                    Dir::Left
                } else {
                    Dir::Right
                };

                slot = Links::child_slot(T::links(cur), dir);
            }

            *slot.as_ptr() = Some(ptr);
            log::trace!("inserted free block of size {size}");
        }

        self.len += 1;
        ptr
    }

    /// Removes an arbitrary block from the tree.
    ///
    /// The returned block has empty links.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not an element of `self`. The tree is not modified in that case.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` points to a live block.
    pub unsafe fn remove(&mut self, node: NonNull<T>) -> T::Handle {
        unsafe {
            log::trace!("removing free block of size {}", node.as_ref().size());

            Self::unlink(NonNull::from(&mut self.root), node);
            self.len -= 1;

            T::from_ptr(node)
        }
    }

    // Detaches `target` from the subtree whose root is held in `root` and clears its links.
    //
    // There are three possible cases:
    //
    // 1. `target` has two children.
    //
    //    Its in-order predecessor (the rightmost block of the left subtree) takes its place. If the
    //    predecessor is the left child itself, it keeps its own left subtree and adopts the right
    //    one. Otherwise the predecessor is first removed from the left subtree; it has no right
    //    child, so that nested removal is always case 2 or 3 and never recurses further.
    //
    // 2. `target` has one child, which takes its place.
    //
    // 3. `target` is a leaf, and its slot is emptied.
    unsafe fn unlink(root: Slot<T>, target: NonNull<T>) {
        unsafe {
            let slot = Self::find_slot(root, target);
            let node = (*slot.as_ptr()).expect("block is not present in the free tree");
            debug_assert_eq!(node, target);

            let left = T::links(node).as_ref().left();
            let right = T::links(node).as_ref().right();

            match (left, right) {
                (Some(left), Some(right)) => {
                    let mut pred = left;
                    while let Some(next) = T::links(pred).as_ref().right() {
                        pred = next;
                    }

                    debug_assert_eq!(
                        Self::predecessor_raw(node),
                        Some(pred),
                        "predecessor walk disagrees with the predecessor finder"
                    );

                    if pred == left {
                        *slot.as_ptr() = Some(left);
                        T::links(left).as_mut().set_right(Some(right));
                    } else {
                        let mut new_left = Some(left);
                        Self::unlink(NonNull::from(&mut new_left), pred);

                        *slot.as_ptr() = Some(pred);
                        T::links(pred).as_mut().set_left(new_left);
                        T::links(pred).as_mut().set_right(Some(right));
                    }

                    debug_assert_ne!(T::links(pred).as_ref().left(), Some(pred));
                    debug_assert_ne!(T::links(pred).as_ref().right(), Some(pred));
                }

                (Some(child), None) | (None, Some(child)) => {
                    *slot.as_ptr() = Some(child);
                }

                (None, None) => {
                    *slot.as_ptr() = None;
                }
            }

            T::links(node).as_mut().clear();
        }
    }

    /// Clears the tree, releasing every block.
    pub fn clear(&mut self) {
        log::debug!("releasing {} free blocks", self.len);

        while let Some(cur) = self.root {
            unsafe {
                match T::links(cur).as_ref().left() {
                    // Rotate right at the root until the root has no left child.
                    Some(left) => {
                        let across = T::links(left).as_mut().set_right(Some(cur));
                        T::links(cur).as_mut().set_left(across);
                        self.root = Some(left);
                    }

                    // Elevate the root's right child (which may be None) and drop the root.
                    None => {
                        self.root = T::links(cur).as_mut().set_right(None);
                        drop(T::from_ptr(cur));
                        self.len -= 1;
                    }
                }
            }
        }

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }
}

impl<T> Default for FreeTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for FreeTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T> fmt::Debug for FreeTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|node| node.size()))
            .finish()
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                children: [None; 2],
                _unpin: PhantomPinned,
            }),
        }
    }

    /// Returns `true` if both child links are empty.
    ///
    /// Blocks that are not linked into a tree, including blocks just removed from one, are always
    /// unlinked.
    #[inline]
    pub fn is_unlinked(&self) -> bool {
        self.left().is_none() && self.right().is_none()
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn clear(&mut self) {
        self.set_left(None);
        self.set_right(None);
    }

    // Returns a pointer to the `dir` child slot of `links`, without creating a reference to it.
    #[inline]
    unsafe fn child_slot(links: NonNull<Self>, dir: Dir) -> NonNull<Link<T>> {
        unsafe {
            let inner = UnsafeCell::raw_get(ptr::addr_of!((*links.as_ptr()).inner));
            NonNull::new_unchecked(ptr::addr_of_mut!((*inner).children[dir as usize]))
        }
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("left", &self.left())
            .field("right", &self.right())
            .finish()
    }
}
