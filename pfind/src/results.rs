/// Per-member crawl counters and their aggregation.
///
/// Every pool member owns one `CrawlResult` per crawl. Only the member's visitor mutates it;
/// once the crawl finishes the results of all members are exchanged and folded into the
/// coordinator's running totals.
use std::fmt;
use std::iter::Sum;

/// Counters produced by one member for one crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlResult {
    /// Filesystem objects visited
    pub entries: u64,
    /// Visited objects that satisfied the match criteria
    pub matches: u64,
}

impl CrawlResult {
    /// Creates an empty result
    pub fn new() -> Self {
        Default::default()
    }

    /// Records one visited entry
    pub fn record(&mut self, matched: bool) {
        self.entries += 1;
        if matched {
            self.matches += 1;
        }
    }

    /// Adds another result into this one
    pub fn absorb(&mut self, other: CrawlResult) {
        self.entries += other.entries;
        self.matches += other.matches;
    }

    /// Sums a sequence of results
    pub fn fold<'a>(results: impl IntoIterator<Item = &'a CrawlResult>) -> CrawlResult {
        results.into_iter().copied().sum()
    }
}

impl Sum for CrawlResult {
    fn sum<I: Iterator<Item = CrawlResult>>(iter: I) -> Self {
        iter.fold(CrawlResult::new(), |mut acc, r| {
            acc.absorb(r);
            acc
        })
    }
}

impl fmt::Display for CrawlResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.matches, self.entries)
    }
}
