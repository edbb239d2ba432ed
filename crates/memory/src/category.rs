//! Allocation categories
//!
//! A category labels allocations for accounting. Each assigned category
//! owns one bit and also carries every bit of its base, so "was this charged
//! to C or to something under C" is a subset test on the raw value and needs
//! no lookup. Categories are handed out by an [`AllocationCategoryService`];
//! the process-wide one is reached through [`allocation_categories`].

use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::RwLock;

/// Label charged with the allocations made under it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AllocationCategory(u64);

impl AllocationCategory {
    /// Uncategorized; every category matches it
    pub const NONE: Self = Self(0);
    /// Base of every assigned category
    pub const ANY: Self = Self(1);

    /// The raw bit set
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// True if `self` is `matcher` or was assigned under it
    #[inline]
    pub const fn is_match(self, matcher: Self) -> bool {
        self.0 & matcher.0 == matcher.0
    }

    /// True only for the very same category
    #[inline]
    pub const fn is_exact_match(self, matcher: Self) -> bool {
        self.0 == matcher.0
    }
}

/// Hands out categories and remembers their names
#[derive(Debug)]
pub struct AllocationCategoryService {
    /// Bit the next category gets; 0 once all 63 are used
    next_bit: u64,
    by_name: HashMap<String, AllocationCategory>,
}

impl AllocationCategoryService {
    /// A service with only [`NONE`](AllocationCategory::NONE) and
    /// [`ANY`](AllocationCategory::ANY)
    pub fn new() -> Self {
        Self {
            next_bit: AllocationCategory::ANY.0 << 1,
            by_name: HashMap::new(),
        }
    }

    /// Register `name` as a category under `base`
    ///
    /// Assigning a name that already exists returns the existing category,
    /// even if `base` differs.
    ///
    /// # Panics
    ///
    /// When all 63 category bits are taken.
    pub fn assign_category(&mut self, base: AllocationCategory, name: &str) -> AllocationCategory {
        if let Some(&existing) = self.by_name.get(name) {
            return existing;
        }
        assert!(
            self.next_bit != 0,
            "allocation categories exhausted while assigning {name:?}"
        );
        let category = AllocationCategory(base.0 | self.next_bit | AllocationCategory::ANY.0);
        self.next_bit <<= 1;
        self.by_name.insert(name.to_owned(), category);
        tracing::debug!(
            target: "jitkit_memory::category",
            name,
            category = category.0,
            "allocation category assigned"
        );
        category
    }

    /// Look a category up by name
    pub fn category_named(&self, name: &str) -> Option<AllocationCategory> {
        self.by_name.get(name).copied()
    }

    /// Name a category was assigned with
    pub fn name_of(&self, category: AllocationCategory) -> Option<&str> {
        match category {
            AllocationCategory::NONE => Some("NoAllocationCategory"),
            AllocationCategory::ANY => Some("AnyAllocationCategory"),
            _ => self
                .by_name
                .iter()
                .find(|(_, c)| c.is_exact_match(category))
                .map(|(name, _)| name.as_str()),
        }
    }

    /// Subset match; see [`AllocationCategory::is_match`]
    pub fn is_match(&self, matchee: AllocationCategory, matcher: AllocationCategory) -> bool {
        matchee.is_match(matcher)
    }

    /// Identity match
    pub fn is_exact_match(&self, matchee: AllocationCategory, matcher: AllocationCategory) -> bool {
        matchee.is_exact_match(matcher)
    }

    /// Number of assigned categories, not counting the two roots
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// True if nothing was assigned yet
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for AllocationCategoryService {
    fn default() -> Self {
        Self::new()
    }
}

static ALLOCATION_CATEGORIES: LazyLock<RwLock<AllocationCategoryService>> =
    LazyLock::new(|| RwLock::new(AllocationCategoryService::new()));

/// The process-wide category service
pub fn allocation_categories() -> &'static RwLock<AllocationCategoryService> {
    &ALLOCATION_CATEGORIES
}
