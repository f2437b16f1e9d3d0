// src/events.rs
//! Maps announcement text to a known recurring industry event.
//!
//! Rules are evaluated in catalog order and the first rule with a trigger
//! contained in the lowercased text wins. Two rules may share a trigger; the
//! later one is then unreachable for that phrase (see [`EventClassifier::shadowed`]).

use std::collections::HashSet;

use crate::config::catalog::EventRule;

#[derive(Debug, Clone)]
pub struct EventClassifier {
    rules: Vec<EventRule>,
}

impl EventClassifier {
    pub fn new(rules: &[EventRule]) -> Self {
        let rules = rules
            .iter()
            .map(|r| EventRule {
                name: r.name.clone(),
                triggers: r.triggers.iter().map(|t| t.to_lowercase()).collect(),
            })
            .collect();
        Self { rules }
    }

    /// Display name of the first matching event, if any.
    pub fn detect_event(&self, text: &str) -> Option<&str> {
        let text = text.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.triggers.iter().any(|t| text.contains(t.as_str())))
            .map(|r| r.name.as_str())
    }

    /// Names whose every trigger is already claimed by an earlier rule.
    pub fn shadowed(&self) -> Vec<&str> {
        let mut claimed: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        for r in &self.rules {
            if r.triggers.iter().all(|t| claimed.contains(t.as_str())) {
                out.push(r.name.as_str());
            }
            claimed.extend(r.triggers.iter().map(String::as_str));
        }
        out
    }
}
