// src/relevance.rs
//! Relevance gate: decides whether an entry is a "big announcement".
//!
//! Plain case-insensitive substring matching over `title + " " + summary`.
//! Exclusion is checked first and always wins.

use crate::config::catalog::KeywordSets;

/// Outcome of the gate, with the keyword that decided it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Excluded(String),
    Included(String),
    NoMatch,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Included(_))
    }
}

#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl RelevanceFilter {
    pub fn new(keywords: &KeywordSets) -> Self {
        let lower = |v: &[String]| v.iter().map(|k| k.to_lowercase()).collect::<Vec<_>>();
        Self {
            include: lower(&keywords.include),
            exclude: lower(&keywords.exclude),
        }
    }

    pub fn verdict(&self, title: &str, summary: &str) -> Verdict {
        let text = format!("{title} {summary}").to_lowercase();
        if let Some(k) = self.exclude.iter().find(|k| text.contains(k.as_str())) {
            return Verdict::Excluded(k.clone());
        }
        match self.include.iter().find(|k| text.contains(k.as_str())) {
            Some(k) => Verdict::Included(k.clone()),
            None => Verdict::NoMatch,
        }
    }

    pub fn is_big_announcement(&self, title: &str, summary: &str) -> bool {
        self.verdict(title, summary).is_accepted()
    }
}
