use std::collections::BTreeSet;

/// `boot-args` as a set of whitespace-delimited tokens, rendered sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootArgs(BTreeSet<String>);

impl BootArgs {
    pub fn parse(raw: &str) -> Self {
        Self(raw.split_whitespace().map(str::to_string).collect())
    }

    pub fn insert(&mut self, token: &str) -> bool {
        self.0.insert(token.to_string())
    }

    pub fn remove(&mut self, token: &str) -> bool {
        self.0.remove(token)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    /// Canonical form: tokens sorted, single-space separated.
    pub fn render(&self) -> String {
        self.0.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
    }
}
