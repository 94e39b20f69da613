//! Full-text index with BM25 ranking.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// BM25 term-frequency saturation.
const K1: f64 = 1.5;
/// BM25 length normalization.
const B: f64 = 0.75;

/// Splits text into index tokens.
pub type Analyzer = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// Lowercases and splits on every non-alphanumeric character.
#[must_use]
pub fn default_analyzer() -> Analyzer {
    Arc::new(tokenize)
}

/// Like [`default_analyzer`], then drops tokens found in `stopwords`.
///
/// Stopwords are matched after lowercasing.
#[must_use]
pub fn stopword_analyzer<I, S>(stopwords: I) -> Analyzer
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let stopwords: HashSet<String> = stopwords.into_iter().map(Into::into).collect();
    Arc::new(move |text: &str| {
        tokenize(text)
            .into_iter()
            .filter(|t| !stopwords.contains(t))
            .collect()
    })
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Inverted index over labelled documents.
///
/// `FtsIndex` keeps:
/// - Inverted index: token → label → term frequency
/// - Forward index: label → token → term frequency (for removal)
/// - Token count per document (for length normalization)
///
/// Queries are conjunctive: a document matches only if it contains every
/// query token.
pub struct FtsIndex {
    analyzer: Analyzer,
    postings: HashMap<String, HashMap<String, usize>>,
    doc_terms: HashMap<String, HashMap<String, usize>>,
    doc_lengths: HashMap<String, usize>,
    total_length: usize,
}

impl FtsIndex {
    /// Creates an empty index using `analyzer` for documents and queries.
    pub fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer,
            postings: HashMap::new(),
            doc_terms: HashMap::new(),
            doc_lengths: HashMap::new(),
            total_length: 0,
        }
    }

    /// Indexes `text` under `label`, replacing any previous text.
    pub fn add(&mut self, label: &str, text: &str) {
        self.remove(label);
        let tokens = (self.analyzer)(text);
        let mut freqs: HashMap<String, usize> = HashMap::with_capacity(tokens.len());
        for token in &tokens {
            *freqs.entry(token.clone()).or_default() += 1;
        }
        for (token, count) in &freqs {
            self.postings
                .entry(token.clone())
                .or_default()
                .insert(label.to_owned(), *count);
        }
        self.doc_terms.insert(label.to_owned(), freqs);
        self.doc_lengths.insert(label.to_owned(), tokens.len());
        self.total_length += tokens.len();
    }

    /// Removes a document. Unknown labels are ignored.
    pub fn remove(&mut self, label: &str) {
        let Some(terms) = self.doc_terms.remove(label) else {
            return;
        };
        if let Some(len) = self.doc_lengths.remove(label) {
            self.total_length -= len;
        }
        for token in terms.keys() {
            if let Some(docs) = self.postings.get_mut(token) {
                docs.remove(label);
                if docs.is_empty() {
                    self.postings.remove(token);
                }
            }
        }
    }

    /// Returns labels matching every query token, best BM25 score first.
    #[must_use]
    pub fn search(&self, query: &str, limit: Option<usize>) -> Vec<String> {
        self.search_scored(query, limit)
            .into_iter()
            .map(|(label, _)| label)
            .collect()
    }

    /// Like [`FtsIndex::search`], with scores.
    #[must_use]
    pub fn search_scored(&self, query: &str, limit: Option<usize>) -> Vec<(String, f64)> {
        let tokens = (self.analyzer)(query);
        let Some((first, rest)) = tokens.split_first() else {
            return Vec::new();
        };

        let mut matches: HashSet<&String> = self
            .postings
            .get(first)
            .map(|docs| docs.keys().collect())
            .unwrap_or_default();
        for token in rest {
            if matches.is_empty() {
                break;
            }
            match self.postings.get(token) {
                Some(docs) => matches.retain(|label| docs.contains_key(*label)),
                None => matches.clear(),
            }
        }

        let mut scored: Vec<(String, f64)> = matches
            .into_iter()
            .map(|label| (label.clone(), self.bm25(&tokens, label)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(limit) = limit {
            scored.truncate(limit);
        }
        scored
    }

    fn bm25(&self, query: &[String], label: &str) -> f64 {
        let (Some(terms), Some(&len)) = (self.doc_terms.get(label), self.doc_lengths.get(label))
        else {
            return 0.0;
        };
        let n = self.doc_terms.len() as f64;
        let avg_len = self.total_length as f64 / self.doc_terms.len().max(1) as f64;
        query
            .iter()
            .filter_map(|token| {
                let tf = *terms.get(token)? as f64;
                let df = self.postings.get(token)?.len() as f64;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                let norm = tf + K1 * (1.0 - B + B * len as f64 / avg_len);
                Some(idf * tf * (K1 + 1.0) / norm)
            })
            .sum()
    }

    /// Returns the number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.doc_terms.len()
    }

    /// Returns true if no documents are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc_terms.is_empty()
    }

    /// Returns the number of distinct tokens.
    #[must_use]
    pub fn unique_token_count(&self) -> usize {
        self.postings.len()
    }
}

impl fmt::Debug for FtsIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtsIndex")
            .field("documents", &self.doc_terms.len())
            .field("tokens", &self.postings.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(docs: &[(&str, &str)]) -> FtsIndex {
        let mut idx = FtsIndex::new(default_analyzer());
        for (label, text) in docs {
            idx.add(label, text);
        }
        idx
    }

    #[test]
    fn default_analyzer_lowercases_and_splits() {
        let analyze = default_analyzer();
        assert_eq!(
            analyze("Hello, World! it's 2024"),
            vec!["hello", "world", "it", "s", "2024"]
        );
        assert!(analyze("  ...  ").is_empty());
    }

    #[test]
    fn stopwords_are_dropped() {
        let analyze = stopword_analyzer(["the", "a"]);
        assert_eq!(analyze("The cat and a hat"), vec!["cat", "and", "hat"]);
    }

    #[test]
    fn conjunctive_search() {
        let idx = index(&[("1", "hello world"), ("2", "hello swift")]);
        let mut both = idx.search("hello", None);
        both.sort();
        assert_eq!(both, vec!["1", "2"]);
        assert_eq!(idx.search("world", None), vec!["1"]);
        assert!(idx.search("swift world", None).is_empty());
        assert!(idx.search("missing", None).is_empty());
        assert!(idx.search("", None).is_empty());
    }

    #[test]
    fn bm25_prefers_higher_term_frequency() {
        let idx = index(&[
            ("a", "rust is fast"),
            ("b", "rust rust rust everywhere"),
            ("c", "python is slow"),
        ]);
        let results = idx.search_scored("rust", None);
        assert_eq!(results[0].0, "b");
        assert_eq!(results[1].0, "a");
        assert!(results[0].1 > results[1].1);
        assert_eq!(idx.search("rust", Some(1)), vec!["b"]);
    }

    #[test]
    fn rare_terms_score_higher() {
        let idx = index(&[("a", "common rare"), ("b", "common"), ("c", "common")]);
        let common = idx.search_scored("common", None);
        let rare = idx.search_scored("rare", None);
        assert!(rare[0].1 > common.iter().find(|(l, _)| l == "a").unwrap().1);
    }

    #[test]
    fn remove_and_replace() {
        let mut idx = index(&[("1", "alpha beta"), ("2", "beta gamma")]);
        idx.remove("1");
        assert!(idx.search("alpha", None).is_empty());
        assert_eq!(idx.search("beta", None), vec!["2"]);
        assert_eq!(idx.len(), 1);

        idx.add("2", "delta");
        assert!(idx.search("beta", None).is_empty());
        assert_eq!(idx.search("delta", None), vec!["2"]);
        assert_eq!(idx.unique_token_count(), 1);

        idx.remove("unknown");
        idx.remove("2");
        assert!(idx.is_empty());
        assert_eq!(idx.unique_token_count(), 0);
    }
}
