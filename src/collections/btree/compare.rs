//! Ordering strategies.

use core::cmp::Ordering;

/// A total order over `T`.
///
/// Implemented for any `Fn(&T, &T) -> Ordering`, so closures work directly:
///
/// ```rust
/// use cowbtree::BTree;
///
/// let mut tree: BTree<i32, _> = BTree::with_compare(8, |a: &i32, b: &i32| b.cmp(a));
/// for i in 0..5 {
///     tree.set(i).unwrap();
/// }
/// assert_eq!(tree.min(), Some(&4));
/// ```
pub trait Compare<T: ?Sized> {
    /// Compares two items.
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

impl<T: ?Sized, F> Compare<T> for F
where
    F: Fn(&T, &T) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self(a, b)
    }
}

/// The order given by `T: Ord`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Natural;

impl<T: Ord + ?Sized> Compare<T> for Natural {
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_and_natural_agree() {
        let by_len = |a: &str, b: &str| a.len().cmp(&b.len());
        assert_eq!(by_len.compare("ab", "c"), Ordering::Greater);
        assert_eq!(Natural.compare("ab", "c"), Ordering::Less);
    }
}
