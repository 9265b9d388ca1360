//! Field projections: which fields to materialize.

/// One component of a projected field path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// A specific field number.
    Tag(u32),
    /// Matches any field number at this depth.
    Any,
}

impl Selector {
    fn matches(self, field_number: u32) -> bool {
        match self {
            Selector::Tag(tag) => tag == field_number,
            Selector::Any => true,
        }
    }
}

/// A dotted path of field numbers, e.g. `2.7` for field 7 inside the
/// submessage at field 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    selectors: Vec<Selector>,
}

impl FieldPath {
    /// A path of concrete field numbers.
    pub fn new(field_numbers: impl IntoIterator<Item = u32>) -> Self {
        Self {
            selectors: field_numbers.into_iter().map(Selector::Tag).collect(),
        }
    }

    /// A path from explicit selectors, wildcards included.
    pub fn from_selectors(selectors: impl IntoIterator<Item = Selector>) -> Self {
        Self {
            selectors: selectors.into_iter().collect(),
        }
    }

    /// Componentwise match over the shorter of the two lengths: projecting
    /// a submessage includes all its fields, and projecting a leaf keeps
    /// the submessages on the way to it.
    fn matches(&self, field_numbers: &[u32]) -> bool {
        self.selectors
            .iter()
            .zip(field_numbers)
            .all(|(selector, &field)| selector.matches(field))
    }

    fn is_match_all(&self) -> bool {
        self.selectors.first() == Some(&Selector::Any) && self.selectors.len() == 1
    }
}

/// The set of field paths a reader wants materialized.
///
/// The default projection keeps everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldProjection {
    paths: Vec<FieldPath>,
}

impl FieldProjection {
    /// Keep every field.
    pub fn all() -> Self {
        Self {
            paths: vec![FieldPath::from_selectors([Selector::Any])],
        }
    }

    /// Keep only the given paths.
    pub fn new(paths: impl IntoIterator<Item = FieldPath>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    /// Adds another path to the projection.
    pub fn add(&mut self, path: FieldPath) {
        self.paths.push(path);
    }

    /// Whether this projection keeps every field.
    pub fn includes_all(&self) -> bool {
        self.paths.iter().any(FieldPath::is_match_all)
    }

    /// Whether a field with the given path of field numbers is kept.
    pub(crate) fn includes(&self, field_numbers: &[u32]) -> bool {
        self.paths.iter().any(|path| path.matches(field_numbers))
    }
}

impl Default for FieldProjection {
    fn default() -> Self {
        Self::all()
    }
}
