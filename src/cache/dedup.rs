use itertools::Itertools;
use std::collections::HashSet;

/// Anything carrying the unique integer identity used for de-duplication
pub trait Identified {
    fn id(&self) -> i64;
}

/// Identities accepted so far in one accumulation session. Only grows until `clear`.
#[derive(Debug, Clone, Default)]
pub struct SeenIdSet {
    ids: HashSet<i64>,
}

impl SeenIdSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Start a new session (new query, category switch)
    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

/// Append the entities of `incoming` not seen before, keeping their relative order.
///
/// Duplicates inside `incoming` keep their first occurrence. Returns how many were
/// accepted.
pub fn append<T, I>(into: &mut Vec<T>, incoming: I, seen: &mut SeenIdSet) -> usize
where
    T: Identified,
    I: IntoIterator<Item = T>,
{
    let before = into.len();
    into.extend(
        incoming
            .into_iter()
            .unique_by(|entity| entity.id())
            .filter(|entity| seen.ids.insert(entity.id())),
    );
    into.len() - before
}
