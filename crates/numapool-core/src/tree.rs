//! Static fan-in tree over ranks
//!
//! Binomial tree: the parent of rank `r > 0` is `r` with its lowest set bit
//! cleared, so rank 0 is the root and depth is `ceil(log2(n))`.
//!
//! ```text
//!   n = 8
//!   0 <- 1
//!   0 <- 2 <- 3
//!   0 <- 4 <- 5
//!        4 <- 6 <- 7
//! ```

/// Parent of `rank`, `None` for the root
#[inline]
pub const fn parent(rank: usize) -> Option<usize> {
    if rank == 0 {
        None
    } else {
        Some(rank & (rank - 1))
    }
}

/// Children of `rank` in a tree of `count` ranks, in ascending order
pub fn children(rank: usize, count: usize) -> Vec<usize> {
    let limit = if rank == 0 { usize::MAX } else { rank & rank.wrapping_neg() };
    let mut out = Vec::new();
    let mut bit = 1usize;
    while bit < limit {
        match rank.checked_add(bit) {
            Some(child) if child < count => out.push(child),
            _ => break,
        }
        bit <<= 1;
    }
    out
}

/// Precomputed child lists for every rank of one pool
#[derive(Debug, Clone, Default)]
pub struct FanInTree {
    children: Vec<Vec<usize>>,
}

impl FanInTree {
    pub fn new(count: usize) -> Self {
        Self {
            children: (0..count).map(|r| children(r, count)).collect(),
        }
    }

    #[inline]
    pub fn children(&self, rank: usize) -> &[usize] {
        &self.children[rank]
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Longest root-to-leaf path
    pub fn depth(&self) -> usize {
        (0..self.len())
            .map(|mut r| {
                let mut d = 0;
                while let Some(p) = parent(r) {
                    r = p;
                    d += 1;
                }
                d
            })
            .max()
            .unwrap_or(0)
    }
}
