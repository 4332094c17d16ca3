/// Page size used when a caller does not configure one.
pub const DEFAULT_PAGE_SIZE: usize = 8;

/// Pagination structure to handle paginated data (repositories, branches,
/// etc.). Pages are 1-based.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Paginated<T> {
    /// Every item of the listing, not just the current page.
    pub items: Vec<T>,
    /// Current page.
    pub page: usize,
    /// Items per page, at least one.
    pub page_size: usize,
    /// Length of `items`.
    pub total_items: usize,
    /// Zero for an empty listing.
    pub total_pages: usize,
}

impl<T> Paginated<T> {
    /// Wraps every item of a listing. Out-of-range pages are clamped.
    pub fn new(items: Vec<T>, page: usize, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let total_items = items.len();
        let total_pages = total_items.div_ceil(page_size);
        let page = page.clamp(1, total_pages.max(1));

        Paginated { items, page, page_size, total_items, total_pages }
    }

    /// Whether a page follows the current one.
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    /// Whether a page precedes the current one.
    pub fn has_prev(&self) -> bool {
        self.page > 1 && self.total_pages > 0
    }

    /// Items of the current page.
    pub fn get_page_items(&self) -> &[T] {
        let start = ((self.page - 1) * self.page_size).min(self.total_items);
        let end = (start + self.page_size).min(self.total_items);
        &self.items[start..end]
    }
}
