use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::trace;

use crate::domain::DEFAULT_PAGE_SIZE;
use crate::record::{Dataset, Record};

// All stages work on row index lists into `Dataset::records`, so a derived
// view never copies record data and ingestion order is the identity.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn arrow(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "↑",
            SortDirection::Descending => "↓",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub key: String,
    pub direction: SortDirection,
}

/// The parameters driving the derived view. Owned and mutated by the model only.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub search_term: String,
    pub column_filters: BTreeMap<String, String>,
    pub sort: Option<SortSpec>,
    pub page_size: usize,
    pub current_page: usize,
    pub selected: Option<usize>,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            search_term: String::new(),
            column_filters: BTreeMap::new(),
            sort: None,
            page_size: DEFAULT_PAGE_SIZE,
            current_page: 1,
            selected: None,
        }
    }
}

impl ViewState {
    pub fn with_page_size(page_size: usize) -> Self {
        ViewState {
            page_size,
            ..ViewState::default()
        }
    }

    /// Pull `current_page` into `[1, total_pages]` for the current filter.
    pub fn clamp_page(&mut self, dataset: &Dataset) {
        let matches = filtered_len(dataset, self);
        let last = total_pages(matches, self.page_size);
        let page = self.current_page.clamp(1, last);
        if page != self.current_page {
            trace!("Clamped page {} -> {page}", self.current_page);
            self.current_page = page;
        }
    }
}

fn contains_folded(value: &str, needle: &str) -> bool {
    !value.is_empty() && value.to_lowercase().contains(needle)
}

fn record_matches(record: &Record, needle: &str) -> bool {
    record.values().iter().any(|v| contains_folded(v, needle))
}

/// Keep rows where any field contains `term`, ignoring case. An empty term keeps everything.
pub fn filter(dataset: &Dataset, rows: &[usize], term: &str) -> Vec<usize> {
    if term.is_empty() {
        return rows.to_vec();
    }
    let needle = term.to_lowercase();
    let records = dataset.records();
    rows.par_iter()
        .copied()
        .filter(|&idx| record_matches(&records[idx], &needle))
        .collect()
}

/// Keep rows whose `field` contains `text`, ignoring case. Unknown fields keep everything.
pub fn filter_column(dataset: &Dataset, rows: &[usize], field: &str, text: &str) -> Vec<usize> {
    let Some(col) = dataset.schema().position(field) else {
        return rows.to_vec();
    };
    if text.is_empty() {
        return rows.to_vec();
    }
    let needle = text.to_lowercase();
    let records = dataset.records();
    rows.par_iter()
        .copied()
        .filter(|&idx| contains_folded(records[idx].value(col), &needle))
        .collect()
}

/// Stable sort on the raw field text. `None`, or a key not in the schema, keeps the input order.
pub fn sort(dataset: &Dataset, rows: &[usize], spec: Option<&SortSpec>) -> Vec<usize> {
    let mut sorted = rows.to_vec();
    let Some(spec) = spec else {
        return sorted;
    };
    let Some(col) = dataset.schema().position(&spec.key) else {
        return sorted;
    };
    let records = dataset.records();
    match spec.direction {
        SortDirection::Ascending => {
            sorted.sort_by(|&a, &b| records[a].value(col).cmp(records[b].value(col)))
        }
        SortDirection::Descending => {
            sorted.sort_by(|&a, &b| records[b].value(col).cmp(records[a].value(col)))
        }
    }
    sorted
}

pub fn total_pages(len: usize, page_size: usize) -> usize {
    std::cmp::max(1, len.div_ceil(page_size.max(1)))
}

/// Slice `[(page-1)*size, page*size)` clamped to `rows`. Overrunning pages are short or empty.
pub fn paginate<T>(rows: &[T], page_size: usize, page: usize) -> &[T] {
    let page_size = page_size.max(1);
    let begin = std::cmp::min(page.saturating_sub(1).saturating_mul(page_size), rows.len());
    let end = std::cmp::min(page.saturating_mul(page_size), rows.len());
    &rows[begin..end]
}

fn filtered(dataset: &Dataset, state: &ViewState) -> Vec<usize> {
    let all: Vec<usize> = (0..dataset.len()).collect();
    let mut rows = filter(dataset, &all, &state.search_term);
    for (field, text) in state.column_filters.iter() {
        rows = filter_column(dataset, &rows, field, text);
    }
    rows
}

fn filtered_len(dataset: &Dataset, state: &ViewState) -> usize {
    filtered(dataset, state).len()
}

/// Filtered and sorted rows plus the pagination of the current page.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedView {
    pub rows: Vec<usize>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub sort: Option<SortSpec>,
}

impl DerivedView {
    pub fn visible(&self) -> &[usize] {
        paginate(&self.rows, self.page_size, self.page)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Recompute the whole Filter -> Sort -> Paginate chain for `state`.
pub fn derive(dataset: &Dataset, state: &ViewState) -> DerivedView {
    let rows = sort(dataset, &filtered(dataset, state), state.sort.as_ref());
    let total_pages = total_pages(rows.len(), state.page_size);
    DerivedView {
        page: state.current_page.clamp(1, total_pages),
        page_size: state.page_size,
        total_pages,
        sort: state.sort.clone(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse;
    use crate::record::tests::STATIONS;

    fn all(ds: &Dataset) -> Vec<usize> {
        (0..ds.len()).collect()
    }

    fn names(ds: &Dataset, rows: &[usize]) -> Vec<String> {
        rows.iter()
            .map(|&r| ds.records()[r].value(0).to_string())
            .collect()
    }

    fn asc(key: &str) -> SortSpec {
        SortSpec {
            key: key.to_string(),
            direction: SortDirection::Ascending,
        }
    }

    #[test]
    fn filter_is_case_insensitive_and_ordered() {
        let ds = parse(STATIONS);
        let rows = filter(&ds, &all(&ds), "yamanote");
        assert_eq!(names(&ds, &rows), vec!["Tokyo", "Shibuya"]);
        assert_eq!(filter(&ds, &all(&ds), "").len(), 3);
        assert_eq!(filter(&ds, &all(&ds), "上野"), vec![2]);
        assert!(filter(&ds, &all(&ds), "osaka").is_empty());
    }

    #[test]
    fn filter_is_idempotent() {
        let ds = parse(include_str!("../tests/fixtures/stations.csv"));
        for term in ["", "a", "GINZA", "imgur", "zzz"] {
            let once = filter(&ds, &all(&ds), term);
            assert_eq!(filter(&ds, &once, term), once, "term {term:?}");
        }
    }

    #[test]
    fn column_filter_only_checks_its_field() {
        let ds = parse(include_str!("../tests/fixtures/stations.csv"));
        let rows = filter_column(&ds, &all(&ds), "TrainLine", "ginza");
        assert_eq!(names(&ds, &rows), vec!["Ueno", "Asakusa", "Ginza", "Kanda"]);
        assert_eq!(filter_column(&ds, &all(&ds), "Nope", "ginza").len(), ds.len());
    }

    #[test]
    fn sort_ascending_and_descending() {
        let ds = parse(STATIONS);
        let rows = sort(&ds, &all(&ds), Some(&asc("StationEN")));
        assert_eq!(names(&ds, &rows), vec!["Shibuya", "Tokyo", "Ueno"]);

        let desc = SortSpec {
            direction: SortDirection::Descending,
            ..asc("StationEN")
        };
        let rows = sort(&ds, &all(&ds), Some(&desc));
        assert_eq!(names(&ds, &rows), vec!["Ueno", "Tokyo", "Shibuya"]);

        assert_eq!(sort(&ds, &[2, 0, 1], None), vec![2, 0, 1]);
    }

    #[test]
    fn sort_is_stable() {
        let ds = parse(include_str!("../tests/fixtures/stations.csv"));
        for direction in [SortDirection::Ascending, SortDirection::Descending] {
            let spec = SortSpec {
                key: "TrainLine".to_string(),
                direction,
            };
            let rows = sort(&ds, &all(&ds), Some(&spec));
            for line in ["Ginza", "Marunouchi", "Yamanote"] {
                let before: Vec<usize> = all(&ds)
                    .into_iter()
                    .filter(|&r| ds.records()[r].get("TrainLine") == Some(line))
                    .collect();
                let after: Vec<usize> = rows
                    .iter()
                    .copied()
                    .filter(|&r| ds.records()[r].get("TrainLine") == Some(line))
                    .collect();
                assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn sort_is_lexicographic() {
        let ds = parse("n\n10\n9\n100\n");
        let rows = sort(&ds, &all(&ds), Some(&asc("n")));
        assert_eq!(names(&ds, &rows), vec!["10", "100", "9"]);
    }

    #[test]
    fn paginate_clamps_and_covers() {
        let rows: Vec<usize> = (0..7).collect();
        assert_eq!(paginate(&rows, 3, 1), &[0, 1, 2]);
        assert_eq!(paginate(&rows, 3, 3), &[6]);
        assert!(paginate(&rows, 3, 4).is_empty());
        assert_eq!(total_pages(7, 3), 3);
        assert_eq!(total_pages(0, 10), 1);

        for size in 1..=8 {
            let pages = total_pages(rows.len(), size);
            let joined: Vec<usize> = (1..=pages)
                .flat_map(|p| paginate(&rows, size, p).to_vec())
                .collect();
            assert_eq!(joined, rows, "page size {size}");
        }
    }

    #[test]
    fn derive_end_to_end() {
        let ds = parse(STATIONS);
        let mut state = ViewState::with_page_size(1);
        state.sort = Some(asc("StationEN"));
        state.current_page = 2;
        let view = derive(&ds, &state);
        assert_eq!(view.total_pages, 3);
        assert_eq!(names(&ds, view.visible()), vec!["Tokyo"]);
        assert!(view.has_previous());
        assert!(view.has_next());
    }

    #[test]
    fn derive_combines_search_and_column_filters() {
        let ds = parse(include_str!("../tests/fixtures/stations.csv"));
        let mut state = ViewState::default();
        state.search_term = "imgur".to_string();
        state
            .column_filters
            .insert("TrainLine".to_string(), "ginza".to_string());
        let view = derive(&ds, &state);
        assert_eq!(names(&ds, &view.rows), vec!["Ueno", "Asakusa", "Kanda"]);
    }

    #[test]
    fn clamp_page_after_shrink() {
        let ds = parse(include_str!("../tests/fixtures/stations.csv"));
        let mut state = ViewState::with_page_size(5);
        state.current_page = 3;
        state.clamp_page(&ds);
        assert_eq!(state.current_page, 3);
        state.search_term = "marunouchi".to_string();
        state.clamp_page(&ds);
        assert_eq!(state.current_page, 1);
        state.search_term = "nothing matches".to_string();
        state.current_page = 0;
        state.clamp_page(&ds);
        assert_eq!(state.current_page, 1);
    }
}
