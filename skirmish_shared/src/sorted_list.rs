//! Ordered container.
//!
//! A `Vec` kept sorted by a caller-supplied strict less-than relation.
//! Insertion is stable: an element goes after every existing element it is
//! not less than, so ties keep insertion order. Insertion is linear, which is
//! fine for the handful of components an entity carries.

/// Strict less-than comparator.
pub type LessFn<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Stable sorted sequence.
pub struct SortedList<T> {
    items: Vec<T>,
    less: LessFn<T>,
}

impl<T> SortedList<T> {
    pub fn new<F>(less: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self {
            items: Vec::new(),
            less: Box::new(less),
        }
    }

    /// Inserts `item` after all elements not greater than it. Returns its index.
    pub fn add(&mut self, item: T) -> usize {
        let idx = self.items.partition_point(|existing| !(self.less)(&item, existing));
        self.items.insert(idx, item);
        idx
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    /// Removes by position; the remaining elements keep their relative order.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }
}

impl<T> IntoIterator for SortedList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a SortedList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for SortedList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn by_key() -> SortedList<(u8, usize)> {
        SortedList::new(|a: &(u8, usize), b: &(u8, usize)| a.0 < b.0)
    }

    #[test]
    fn add_keeps_ascending_order() {
        let mut list = by_key();
        assert_eq!(list.add((5, 0)), 0);
        assert_eq!(list.add((1, 1)), 0);
        assert_eq!(list.add((3, 2)), 1);
        assert_eq!(list.add((9, 3)), 3);

        let keys: Vec<u8> = list.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 3, 5, 9]);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut list = by_key();
        list.add((2, 0));
        list.add((1, 1));
        list.add((2, 2));
        list.add((1, 3));
        list.add((2, 4));

        let order: Vec<usize> = list.iter().map(|(_, seq)| *seq).collect();
        assert_eq!(order, vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn random_sequences_are_sorted_and_stable() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let mut list = by_key();
            let n = rng.gen_range(0..16);
            for seq in 0..n {
                list.add((rng.gen_range(0..4), seq));
            }
            let items: Vec<_> = list.iter().copied().collect();
            for pair in items.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                assert!(a.0 < b.0 || (a.0 == b.0 && a.1 < b.1), "{items:?}");
            }
        }
    }

    #[test]
    fn remove_preserves_relative_order() {
        let mut list = by_key();
        for (seq, key) in [3u8, 1, 2, 1].into_iter().enumerate() {
            list.add((key, seq));
        }
        assert_eq!(list.remove(1), Some((1, 3)));
        assert_eq!(list.remove(10), None);

        let items: Vec<_> = list.into_iter().collect();
        assert_eq!(items, vec![(1, 1), (2, 2), (3, 0)]);
    }
}
