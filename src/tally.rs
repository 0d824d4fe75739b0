//! Occurrence counting that remembers first-seen order

/// Counts of string keys in the order each key was first seen
#[derive(Debug, Clone, Default)]
pub struct Tally {
    entries: Vec<(String, usize)>,
}

impl Tally {
    /// Count every item of an iterator
    pub fn from_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tally = Self::default();
        for item in items {
            tally.add(item);
        }
        tally
    }

    /// Count one occurrence
    pub fn add(&mut self, item: impl Into<String>) {
        let item = item.into();
        match self.entries.iter_mut().find(|(key, _)| *key == item) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((item, 1)),
        }
    }

    /// The most frequent key; ties go to the key seen first
    pub fn most_common(&self) -> Option<(&str, usize)> {
        let mut best: Option<(&str, usize)> = None;
        for (key, count) in &self.entries {
            if best.map_or(true, |(_, top)| *count > top) {
                best = Some((key.as_str(), *count));
            }
        }
        best
    }

    /// Keys and counts in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(key, count)| (key.as_str(), *count))
    }
}
