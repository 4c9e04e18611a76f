use crate::{FreeTree, Link, Links, TreeNode};

/// An iterator over the blocks of a [`FreeTree`], in order of non-decreasing size.
///
/// Blocks carry no parent links, so each step retraces the path from the root to find the next
/// block. Iterating the whole tree takes _O(n · height)_ time and no extra memory.
pub struct Iter<'tree, T: TreeNode<Links<T>> + ?Sized> {
    tree: &'tree FreeTree<T>,
    next: Link<T>,
    len: usize,
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iter<'tree, T> {
    pub(crate) fn new(tree: &'tree FreeTree<T>) -> Self {
        let next = tree
            .root
            .map(|root| unsafe { FreeTree::<T>::min_in_subtree(root) });

        Iter {
            tree,
            next,
            len: tree.len(),
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iterator for Iter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next?;

        // SAFETY: `cur` is an element of the tree, which is borrowed for `'tree`.
        unsafe {
            self.next = self.tree.successor_raw(cur);
            self.len -= 1;

            Some(cur.as_ref())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> ExactSizeIterator for Iter<'tree, T> {}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> IntoIterator for &'tree FreeTree<T> {
    type Item = &'tree T;
    type IntoIter = Iter<'tree, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
