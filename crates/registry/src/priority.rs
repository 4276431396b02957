use std::sync::Arc;

/// Anything that can be ranked in a [`PriorityList`].
pub trait Prioritized {
    fn priority(&self) -> i32;
}

impl<T: Prioritized + ?Sized> Prioritized for Arc<T> {
    fn priority(&self) -> i32 {
        (**self).priority()
    }
}

/// Records kept in descending priority order.
///
/// A new record goes after every record of greater *or equal* priority, so
/// among ties the first registered is the first tried.
#[derive(Debug)]
pub struct PriorityList<R> {
    records: Vec<R>,
}

impl<R> Default for PriorityList<R> {
    fn default() -> Self {
        Self { records: Vec::new() }
    }
}

impl<R: Prioritized> PriorityList<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` at its upper bound and return the position it landed at.
    pub fn insert(&mut self, record: R) -> usize {
        let priority = record.priority();
        let at = self.records.partition_point(|r| r.priority() >= priority);
        self.records.insert(at, record);
        at
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.records.iter()
    }

    pub fn first(&self) -> Option<&R> {
        self.records.first()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a, R> IntoIterator for &'a PriorityList<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
