//! Offset pagination shared by the HTML pages and the JSON API.

use rusqlite::{Connection, Row, ToSql};

/// One page of results plus enough bookkeeping to render page links.
#[derive(Debug, Clone)]
pub struct Pagination<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl<T> Pagination<T> {
    pub fn pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        let per_page = i64::from(self.per_page);
        ((self.total + per_page - 1) / per_page) as u32
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages()
    }

    pub fn prev_num(&self) -> Option<u32> {
        self.has_prev().then(|| self.page - 1)
    }

    pub fn next_num(&self) -> Option<u32> {
        self.has_next().then(|| self.page + 1)
    }

    /// Page numbers to show in a pager; `None` marks a gap.
    pub fn iter_pages(&self) -> Vec<Option<u32>> {
        const LEFT_EDGE: u32 = 2;
        const LEFT_CURRENT: u32 = 2;
        const RIGHT_CURRENT: u32 = 5;
        const RIGHT_EDGE: u32 = 2;

        let pages = self.pages();
        let page = i64::from(self.page);
        let mut out = Vec::new();
        let mut last = 0;
        for num in 1..=pages {
            let n = i64::from(num);
            let visible = num <= LEFT_EDGE
                || (n > page - i64::from(LEFT_CURRENT) - 1 && n < page + i64::from(RIGHT_CURRENT))
                || num + RIGHT_EDGE > pages;
            if visible {
                if last + 1 != num {
                    out.push(None);
                }
                out.push(Some(num));
                last = num;
            }
        }
        out
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Pagination<U> {
        Pagination {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
        }
    }
}

/// Turn a raw `?page=` value into a 1-based page number.
pub fn clamp_page(raw: Option<i64>) -> u32 {
    match raw {
        Some(p) if p >= 1 => p.min(i64::from(u32::MAX)) as u32,
        _ => 1,
    }
}

/// Last page for `total` rows; an empty set still has page 1.
pub fn last_page(total: i64, per_page: u32) -> u32 {
    if total <= 0 || per_page == 0 {
        return 1;
    }
    let per_page = i64::from(per_page);
    ((total - 1) / per_page + 1) as u32
}

/// Run a count query and a page query sharing the same positional `?`
/// arguments. `select_sql` gets `LIMIT ? OFFSET ?` appended.
pub fn fetch_page<T, F>(
    conn: &Connection,
    count_sql: &str,
    select_sql: &str,
    args: &[&dyn ToSql],
    page: u32,
    per_page: u32,
    map: F,
) -> rusqlite::Result<Pagination<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let page = page.max(1);
    let total: i64 = conn.query_row(count_sql, args, |row| row.get(0))?;

    let limit = i64::from(per_page);
    let offset = i64::from(page - 1) * limit;
    let mut all: Vec<&dyn ToSql> = args.to_vec();
    all.push(&limit);
    all.push(&offset);

    let sql = format!("{} LIMIT ? OFFSET ?", select_sql);
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(all.as_slice(), map)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Pagination {
        items,
        page,
        per_page,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(page: u32, per_page: u32, total: i64) -> Pagination<()> {
        Pagination {
            items: Vec::new(),
            page,
            per_page,
            total,
        }
    }

    #[test]
    fn pages_round_up() {
        assert_eq!(page(1, 20, 0).pages(), 0);
        assert_eq!(page(1, 20, 1).pages(), 1);
        assert_eq!(page(1, 20, 20).pages(), 1);
        assert_eq!(page(1, 20, 21).pages(), 2);
    }

    #[test]
    fn prev_and_next_at_boundaries() {
        let first = page(1, 10, 25);
        assert!(!first.has_prev());
        assert_eq!(first.next_num(), Some(2));

        let last = page(3, 10, 25);
        assert_eq!(last.prev_num(), Some(2));
        assert!(!last.has_next());

        let beyond = page(7, 10, 25);
        assert!(beyond.has_prev());
        assert!(!beyond.has_next());
    }

    #[test]
    fn iter_pages_inserts_gaps() {
        let p = page(10, 1, 20);
        assert_eq!(
            p.iter_pages(),
            vec![
                Some(1),
                Some(2),
                None,
                Some(8),
                Some(9),
                Some(10),
                Some(11),
                Some(12),
                Some(13),
                Some(14),
                None,
                Some(19),
                Some(20),
            ]
        );
    }

    #[test]
    fn iter_pages_without_gaps_for_small_sets() {
        let p = page(1, 10, 30);
        assert_eq!(p.iter_pages(), vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn clamp_page_rejects_non_positive() {
        assert_eq!(clamp_page(None), 1);
        assert_eq!(clamp_page(Some(0)), 1);
        assert_eq!(clamp_page(Some(-4)), 1);
        assert_eq!(clamp_page(Some(3)), 3);
    }

    #[test]
    fn last_page_of_empty_set_is_one() {
        assert_eq!(last_page(0, 30), 1);
        assert_eq!(last_page(30, 30), 1);
        assert_eq!(last_page(31, 30), 2);
    }

    #[test]
    fn fetch_page_limits_and_offsets() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE n (v INTEGER);
             WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 25)
             INSERT INTO n SELECT x FROM c;",
        )
        .unwrap();

        let min = 3i64;
        let p = fetch_page(
            &conn,
            "SELECT COUNT(*) FROM n WHERE v >= ?",
            "SELECT v FROM n WHERE v >= ? ORDER BY v",
            &[&min],
            2,
            10,
            |row| row.get::<_, i64>(0),
        )
        .unwrap();

        assert_eq!(p.total, 23);
        assert_eq!(p.items, (13..=22).collect::<Vec<i64>>());
        assert_eq!(p.pages(), 3);

        let past_end = fetch_page(
            &conn,
            "SELECT COUNT(*) FROM n WHERE v >= ?",
            "SELECT v FROM n WHERE v >= ? ORDER BY v",
            &[&min],
            9,
            10,
            |row| row.get::<_, i64>(0),
        )
        .unwrap();
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 23);
    }
}
