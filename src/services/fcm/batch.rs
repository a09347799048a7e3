use std::num::NonZeroUsize;

/// Size of every batch but the last: `ceil(n / max_connections)`, raised to
/// `min_streams` when smaller.
#[must_use]
pub fn batch_size(target_count: usize, max_connections: NonZeroUsize, min_streams: NonZeroUsize) -> usize {
    target_count.div_ceil(max_connections.get()).max(min_streams.get())
}

/// Splits `targets` into contiguous batches of [`batch_size`]. The batches
/// concatenate back to `targets` exactly; only the last may be shorter.
#[must_use]
pub fn plan_batches<T>(targets: &[T], max_connections: NonZeroUsize, min_streams: NonZeroUsize) -> Vec<&[T]> {
    if targets.is_empty() {
        return Vec::new();
    }
    targets.chunks(batch_size(targets.len(), max_connections, min_streams)).collect()
}
