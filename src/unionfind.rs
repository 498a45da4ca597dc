//! A disjoint-set forest over dense e-class ids.

use crate::Id;

/// A union-find (disjoint-set forest) with union by rank and
/// path-halving compression.
///
/// Ids are dense, starting at 0, and handed out by [`make_set`].
/// [`find`] is read-only; [`find_compress`] additionally halves the
/// path it walks. [`merge`] is total: merging a set with itself is a
/// no-op returning the root.
///
/// Calling any operation with an id that was never returned by
/// [`make_set`] is a programmer error and panics.
///
/// [`make_set`]: UnionFind::make_set
/// [`find`]: UnionFind::find
/// [`find_compress`]: UnionFind::find_compress
/// [`merge`]: UnionFind::merge
#[derive(Debug, Clone, Default)]
pub struct UnionFind {
    parents: Vec<Id>,
    ranks: Vec<u8>,
}

impl UnionFind {
    /// Creates a fresh singleton set and returns its id.
    pub fn make_set(&mut self) -> Id {
        let id = Id::from(self.parents.len());
        self.parents.push(id);
        self.ranks.push(0);
        id
    }

    /// The number of ids handed out so far.
    pub fn size(&self) -> usize {
        self.parents.len()
    }

    fn parent(&self, query: Id) -> Id {
        self.parents[usize::from(query)]
    }

    /// Finds the root of `current` without modifying the forest.
    pub fn find(&self, mut current: Id) -> Id {
        while self.parent(current) != current {
            current = self.parent(current);
        }
        current
    }

    /// Finds the root of `current`, halving the walked path.
    pub fn find_compress(&mut self, mut current: Id) -> Id {
        while self.parent(current) != current {
            let grandparent = self.parent(self.parent(current));
            self.parents[usize::from(current)] = grandparent;
            current = grandparent;
        }
        current
    }

    /// Unions the sets containing `a` and `b`, returning the surviving
    /// root. Union is by rank; on equal rank the smaller id survives,
    /// which makes the canonical representative deterministic.
    pub fn merge(&mut self, a: Id, b: Id) -> Id {
        let a = self.find_compress(a);
        let b = self.find_compress(b);
        if a == b {
            return a;
        }

        let (root, child) = match self.ranks[usize::from(a)].cmp(&self.ranks[usize::from(b)]) {
            std::cmp::Ordering::Greater => (a, b),
            std::cmp::Ordering::Less => (b, a),
            std::cmp::Ordering::Equal => {
                let root = a.min(b);
                self.ranks[usize::from(root)] += 1;
                (root, a.max(b))
            }
        };

        self.parents[usize::from(child)] = root;
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_find() {
        let n = 10;
        let id = Id::from;

        let mut uf = UnionFind::default();
        for _ in 0..n {
            uf.make_set();
        }

        // everyone in their own set
        for i in 0..n {
            assert_eq!(uf.find(id(i)), id(i));
        }

        // build up one set
        uf.merge(id(0), id(1));
        uf.merge(id(0), id(2));
        uf.merge(id(0), id(3));

        // build up another set
        uf.merge(id(6), id(7));
        uf.merge(id(6), id(8));
        uf.merge(id(6), id(9));

        // this should compress all paths
        for i in 0..n {
            uf.find_compress(id(i));
        }

        let expected = [0, 0, 0, 0, 4, 5, 6, 6, 6, 6];
        for i in 0..n {
            assert_eq!(uf.find(id(i)), id(expected[i]));
        }
    }

    #[test]
    fn merge_is_total() {
        let mut uf = UnionFind::default();
        let a = uf.make_set();
        assert_eq!(uf.merge(a, a), a);
    }

    #[test]
    fn equal_rank_prefers_smaller_id() {
        let mut uf = UnionFind::default();
        let a = uf.make_set();
        let b = uf.make_set();
        assert_eq!(uf.merge(b, a), a);
    }
}
