use serde::{Deserialize, Serialize};

use crate::{form::Form, MAX_PAGE_SIZE};

/// Pages past this one could not be addressed by an `i64` offset.
const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_SIZE;

/// `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: page.clamp(1, MAX_PAGE),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn from_form(form: &Form, default_limit: i64) -> Result<Self, potion::Error> {
        let page = form.get_number::<i64>("page")?.unwrap_or(1);
        let limit = form.get_number::<i64>("limit")?.unwrap_or(default_limit);

        Ok(Self::new(page, limit))
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    /// `total_rows` is the size of the whole listing, not of `rows`.
    pub fn from_rows(rows: Vec<T>, total_rows: i64, pagination: &Pagination) -> Self {
        if rows.len() <= 0 {
            return Self::no_rows(total_rows, pagination);
        }

        let end = pagination.offset().saturating_add(pagination.limit);
        let next = (end < total_rows).then(|| pagination.page + 1);
        let previous = (pagination.page > 1).then(|| pagination.page - 1);

        Self {
            count: total_rows,
            next,
            previous,
            results: rows,
        }
    }

    pub fn no_rows(total_rows: i64, pagination: &Pagination) -> Self {
        let last_page = ((total_rows + pagination.limit - 1) / pagination.limit).max(1);

        Self {
            count: total_rows,
            next: None,
            previous: (pagination.page > 1).then(|| pagination.page.min(last_page + 1) - 1),
            results: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_page_and_limit() {
        assert_eq!(Pagination::new(1, 6).offset(), 0);
        assert_eq!(Pagination::new(3, 6).offset(), 12);
        assert_eq!(Pagination::new(0, 0), Pagination::new(1, 1));
        assert_eq!(Pagination::new(1, 10_000).limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let form = Form::from_data(vec![(String::from("page"), i64::MAX.to_string())]);
        let pagination = Pagination::from_form(&form, 6).unwrap();

        assert_eq!(pagination.page, MAX_PAGE);
        assert!(pagination.offset() > 0);

        let last = Pagination::new(i64::MAX, MAX_PAGE_SIZE);
        let page: PageContext<i32> = PageContext::from_rows(vec![1], 3, &last);
        assert_eq!(page.next, None);
        assert_eq!(page.previous, Some(MAX_PAGE - 1));
    }

    #[test]
    fn middle_page_links_both_ways() {
        let page = PageContext::from_rows(vec![1, 2, 3, 4, 5, 6], 20, &Pagination::new(2, 6));

        assert_eq!(page.count, 20);
        assert_eq!(page.next, Some(3));
        assert_eq!(page.previous, Some(1));
    }

    #[test]
    fn last_page_has_no_next() {
        let page = PageContext::from_rows(vec![1, 2], 14, &Pagination::new(3, 6));

        assert_eq!(page.next, None);
        assert_eq!(page.previous, Some(2));
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let page: PageContext<i32> = PageContext::from_rows(vec![], 0, &Pagination::new(4, 6));

        assert!(page.results.is_empty());
        assert_eq!(page.next, None);
        assert_eq!(page.previous, Some(1));
    }
}
