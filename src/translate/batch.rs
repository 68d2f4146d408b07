/// Group size used when no explicit size is given.
pub const DEFAULT_BATCH_SIZE: usize = 30;

/// Split `items` into contiguous, order-preserving groups of at most `size`.
///
/// Only the last group may be shorter. A `size` of zero is treated as one.
pub fn batch<T>(items: &[T], size: usize) -> Vec<&[T]> {
    items.chunks(size.max(1)).collect()
}

/// [`batch`] with [`DEFAULT_BATCH_SIZE`].
pub fn batch_default<T>(items: &[T]) -> Vec<&[T]> {
    batch(items, DEFAULT_BATCH_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let items: Vec<u32> = vec![];
        assert!(batch(&items, 10).is_empty());
    }

    #[test]
    fn test_last_batch_shorter() {
        let items: Vec<u32> = (1..=23).collect();
        let batches = batch(&items, 10);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 10);
        assert_eq!(batches[1].len(), 10);
        assert_eq!(batches[2], &[21, 22, 23]);
    }

    #[test]
    fn test_concatenation_reproduces_input() {
        for size in 1..=12 {
            let items: Vec<usize> = (0..37).collect();
            let batches = batch(&items, size);

            let rejoined: Vec<usize> = batches.iter().flat_map(|b| b.iter().copied()).collect();
            assert_eq!(rejoined, items);

            let (last, rest) = batches.split_last().unwrap();
            assert!(rest.iter().all(|b| b.len() == size));
            assert!(!last.is_empty() && last.len() <= size);
        }
    }

    #[test]
    fn test_default_size() {
        let items: Vec<u8> = vec![0; 61];
        let sizes: Vec<usize> = batch_default(&items).iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![30, 30, 1]);
    }

    #[test]
    fn test_zero_size_does_not_hang() {
        let items = [1, 2, 3];
        assert_eq!(batch(&items, 0).len(), 3);
    }
}
