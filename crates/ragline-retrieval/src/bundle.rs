use std::collections::HashMap;

use ragline_corpus::Candidate;

pub const DEFAULT_SEPARATOR: &str = "\n\n---\n\n";

/// Insertion-ordered candidates keyed by id. The first insert of an id wins.
#[derive(Debug, Clone, Default)]
pub struct SourceDocuments {
    entries: Vec<Candidate>,
    index: HashMap<String, usize>,
}

impl SourceDocuments {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` and leaves the map unchanged when `candidate.id` is already present.
    pub fn insert(&mut self, candidate: Candidate) -> bool {
        if self.index.contains_key(&candidate.id) {
            return false;
        }
        self.index.insert(candidate.id.clone(), self.entries.len());
        self.entries.push(candidate);
        true
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Candidate> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|c| c.id.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Candidate> {
        self.entries
    }
}

impl FromIterator<Candidate> for SourceDocuments {
    fn from_iter<I: IntoIterator<Item = Candidate>>(iter: I) -> Self {
        let mut docs = Self::new();
        for c in iter {
            docs.insert(c);
        }
        docs
    }
}

impl<'a> IntoIterator for &'a SourceDocuments {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Retrieved context for one chat turn.
#[derive(Debug, Clone, Default)]
pub struct ContextBundle {
    pub context_string: String,
    pub source_documents: SourceDocuments,
}

impl ContextBundle {
    #[must_use]
    pub fn new(source_documents: SourceDocuments, separator: &str) -> Self {
        let context_string = render_context(source_documents.iter().map(|c| c.text.as_str()), separator);
        Self {
            context_string,
            source_documents,
        }
    }

    #[must_use]
    pub fn source_document_ids(&self) -> Vec<String> {
        self.source_documents.ids().map(str::to_owned).collect()
    }
}

/// Render texts as numbered sections joined by `separator`.
#[must_use]
pub fn render_context<'a, I>(texts: I, separator: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| format!("### Document {}\n{}", i + 1, text.trim()))
        .collect::<Vec<_>>()
        .join(separator)
}
