//! Shannon entropy over fixed-size blocks.
//!
//! Encrypted, compressed, or densely encoded payloads masquerading as
//! plain data show near-maximal byte entropy. The signal here is a plain
//! boolean — "did any block reach the threshold" — kept independent of
//! the n-gram suspicion score so callers can combine them as policy, not
//! arithmetic.

/// Shannon entropy of one block, in bits per byte (0.0 ..= 8.0).
pub fn shannon_entropy(block: &[u8]) -> f64 {
    if block.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for &b in block {
        counts[b as usize] += 1;
    }
    let len = block.len() as f64;
    let mut entropy = 0.0;
    for &count in counts.iter() {
        if count == 0 {
            continue;
        }
        let p = count as f64 / len;
        entropy -= p * p.log2();
    }
    entropy
}

/// Entropy of each `block_size` window of `data`; the final partial
/// block is measured as-is.
pub fn block_entropies(data: &[u8], block_size: usize) -> Vec<f64> {
    data.chunks(block_size).map(shannon_entropy).collect()
}

/// True when any block of `data` meets or exceeds `threshold` bits/byte.
pub fn is_high_entropy(data: &[u8], block_size: usize, threshold: f64) -> bool {
    data.chunks(block_size)
        .any(|block| shannon_entropy(block) >= threshold)
}
