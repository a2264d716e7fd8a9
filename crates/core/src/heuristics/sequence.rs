//! Ratcliff/Obershelp ("gestalt pattern matching") similarity of two sequences.

use std::collections::HashMap;
use std::hash::Hash;

/// A run of `len` equal elements starting at `a` in the first sequence and `b` in the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MatchingBlock {
    pub a: usize,
    pub b: usize,
    pub len: usize,
}

/// `2 * M / (len(a) + len(b))`, where `M` is the number of elements covered by the
/// matching blocks. Two empty sequences compare as identical (`1.0`).
pub fn sequence_ratio<T: Eq + Hash>(a: &[T], b: &[T]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched: usize = matching_blocks(a, b).iter().map(|m| m.len).sum();
    2.0 * matched as f64 / total as f64
}

/// Non-overlapping matching blocks, ordered by position.
///
/// Finds the longest common contiguous run, then repeats on the pieces left and
/// right of it. Ties prefer the earliest run in `a`, then the earliest in `b`.
pub fn matching_blocks<T: Eq + Hash>(a: &[T], b: &[T]) -> Vec<MatchingBlock> {
    let finder = RunFinder::new(a, b);
    let mut pending = vec![(0, a.len(), 0, b.len())];
    let mut blocks = Vec::new();

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let m = finder.longest_run(alo, ahi, blo, bhi);
        if m.len == 0 {
            continue;
        }
        if alo < m.a && blo < m.b {
            pending.push((alo, m.a, blo, m.b));
        }
        if m.a + m.len < ahi && m.b + m.len < bhi {
            pending.push((m.a + m.len, ahi, m.b + m.len, bhi));
        }
        blocks.push(m);
    }

    blocks.sort();
    blocks
}

struct RunFinder<'a, T> {
    a: &'a [T],
    /// Positions of every element of `b`, ascending.
    b2j: HashMap<&'a T, Vec<usize>>,
}

impl<'a, T: Eq + Hash> RunFinder<'a, T> {
    fn new(a: &'a [T], b: &'a [T]) -> Self {
        let mut b2j: HashMap<&'a T, Vec<usize>> = HashMap::new();
        for (j, elem) in b.iter().enumerate() {
            b2j.entry(elem).or_default().push(j);
        }
        Self { a, b2j }
    }

    fn longest_run(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> MatchingBlock {
        let mut best = MatchingBlock { a: alo, b: blo, len: 0 };
        // j2len[j] = length of the run ending at a[i - 1] and b[j].
        let mut j2len: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j.checked_sub(1).and_then(|p| j2len.get(&p)).copied().unwrap_or(0) + 1;
                    next.insert(j, k);
                    if k > best.len {
                        best = MatchingBlock { a: i + 1 - k, b: j + 1 - k, len: k };
                    }
                }
            }
            j2len = next;
        }
        best
    }
}
