extern crate std;

use core::ptr::NonNull;
use std::{collections::VecDeque, fmt, prelude::v1::*};

use crate::{FreeTree, Links, TreeNode};

impl<T> FreeTree<T>
where
    T: TreeNode<Links<T>>,
{
    /// Writes a Graphviz rendering of the tree to `w`.
    ///
    /// Blocks are labelled with their size and numbered in breadth-first order, since sizes are
    /// not unique.
    pub fn dotgraph<W>(&self, name: &str, mut w: W) -> fmt::Result
    where
        W: fmt::Write,
    {
        let root = match self.root {
            Some(r) => r,
            None => return write!(w, "digraph \"graph-{name}\" {{}}"),
        };

        enum Item<T> {
            Node(NonNull<T>, usize),
            Missing(u32),
        }

        let mut queue = VecDeque::new();
        queue.push_back(Item::Node(root, 0));

        write!(
            w,
            "digraph \"graph-{name}\" {{\n subgraph \"subgraph-{name}\" {{"
        )?;

        let mut next_id = 1;
        let mut missing = 0;
        let mut links = String::new();

        loop {
            use fmt::Write;
            let remaining = queue.len();
            if remaining == 0 {
                break;
            }

            write!(w, "{{rank=same; ")?;

            for _ in 0..remaining {
                let Some(item) = queue.pop_front() else {
                    break;
                };

                let (node, id) = match item {
                    Item::Node(node, id) => (node, id),
                    Item::Missing(id) => {
                        write!(w, "\"graph{name}-missing{id}\" [shape=point]; ")?;
                        continue;
                    }
                };

                let size = unsafe { node.as_ref().size() };
                write!(w, "\"graph{name}-{id}\" [label=\"{size}\"]; ")?;

                let children = unsafe {
                    let node_links = T::links(node).as_ref();
                    [node_links.left(), node_links.right()]
                };

                for child in children {
                    if let Some(child) = child {
                        queue.push_back(Item::Node(child, next_id));
                        writeln!(links, "\"graph{name}-{id}\" -> \"graph{name}-{next_id}\";")?;
                        next_id += 1;
                    } else {
                        queue.push_back(Item::Missing(missing));
                        writeln!(
                            links,
                            "\"graph{name}-{id}\" -> \"graph{name}-missing{missing}\";"
                        )?;
                        missing += 1;
                    }
                }
            }

            writeln!(w, "}}")?;
        }

        w.write_str(&links)?;

        w.write_str(" }\n}")
    }
}
