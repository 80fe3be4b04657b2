use anyhow::{Result, ensure};
use flexer::{DESCRIPTOR_SIZE, capacity};

/// Most rows a single table may hold.
pub const MAX_ROWS: usize = 1 << 20;

/// One row of the size table: a requested size, the capacity it becomes, and the
/// pages that capacity occupies together with its descriptor record.
#[derive(Debug, PartialEq, Eq)]
pub struct SizeRow {
    pub requested: usize,
    pub legal: usize,
    pub pages: usize,
}

impl SizeRow {
    fn new(requested: usize) -> SizeRow {
        let legal = capacity::normalize_requested_size(requested);
        SizeRow {
            requested,
            legal,
            pages: legal.saturating_add(DESCRIPTOR_SIZE).div_ceil(capacity::PAGE_SIZE),
        }
    }

    /// Bytes left over in the last page once the region and its record are placed.
    pub fn slack(&self) -> usize {
        self.pages
            .saturating_mul(capacity::PAGE_SIZE)
            .saturating_sub(self.legal.saturating_add(DESCRIPTOR_SIZE))
    }
}

pub fn run(from: usize, to: usize, changed_only: bool) -> Result<()> {
    let mut listed = 0;
    println!("{:>12}  {:>12}  {:>6}  {:>6}", "requested", "capacity", "pages", "slack");
    for row in size_rows(from, to, changed_only)? {
        println!(
            "{:>12}  {:>12}  {:>6}  {:>6}",
            row.requested,
            row.legal,
            row.pages,
            row.slack()
        );
        listed += 1;
    }
    log::info!("{listed} sizes listed");
    Ok(())
}

/// Rows for every requested size in `from..=to`, produced lazily.
///
/// Ranges wider than [`MAX_ROWS`] are rejected.
pub fn size_rows(
    from: usize,
    to: usize,
    changed_only: bool,
) -> Result<impl Iterator<Item = SizeRow>> {
    ensure!(from <= to, "invalid range: {from} > {to}");
    ensure!(
        to - from < MAX_ROWS,
        "range {from}..={to} exceeds {MAX_ROWS} sizes"
    );
    Ok((from..=to)
        .map(SizeRow::new)
        .filter(move |row| !changed_only || row.legal != row.requested))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_sizes() {
        let legal: Vec<_> = size_rows(0, 5, false).unwrap().map(|r| r.legal).collect();
        assert_eq!(legal, [2, 2, 2, 4, 4, 6]);
    }

    #[test]
    fn test_changed_only() {
        let rows: Vec<_> = size_rows(4094, 4098, true).unwrap().collect();
        let summary: Vec<_> = rows
            .iter()
            .map(|r| (r.requested, r.legal, r.pages, r.slack()))
            .collect();
        assert_eq!(
            summary,
            [
                (4095, 4072, 1, 0),
                (4096, 4072, 1, 0),
                (4097, 8168, 2, 0),
                (4098, 8168, 2, 0),
            ]
        );
    }

    #[test]
    fn test_small_capacity_slack() {
        let row = SizeRow::new(100);
        assert_eq!(row.pages, 1);
        assert_eq!(row.slack(), 4096 - 100 - DESCRIPTOR_SIZE);
    }

    #[test]
    fn test_invalid_range() {
        assert!(size_rows(10, 9, false).is_err());
        assert!(size_rows(0, usize::MAX, false).is_err());
        assert_eq!(size_rows(usize::MAX - 3, usize::MAX, false).unwrap().count(), 4);
        assert_eq!(size_rows(0, MAX_ROWS - 1, false).unwrap().count(), MAX_ROWS);
    }
}
