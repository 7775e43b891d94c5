//! Placeholder id/label derivation shared by the regex and classifier paths.

use std::collections::HashSet;

/// Lowercases, collapses every non-alphanumeric run to one `_`, and trims
/// leading/trailing underscores. `"Client Name!"` → `"client_name"`.
pub fn sanitize_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;
    for c in raw.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }
    out
}

/// Display label from a token's inner text: `"client_name"` → `"Client Name"`.
pub fn humanize_label(raw: &str) -> String {
    raw.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hands out document-unique ids. Named ids that collide get `_2`, `_3`, …
/// and their labels get ` (2)`, ` (3)`, …; anonymous ids are `placeholder_N`.
#[derive(Debug, Default)]
pub struct IdAllocator {
    used: HashSet<String>,
    anonymous: usize,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an id derived from `seed`. Falls back to the anonymous
    /// sequence when `seed` sanitizes to nothing.
    pub fn allocate(&mut self, seed: &str, label: &str) -> (String, String) {
        let base = sanitize_id(seed);
        if base.is_empty() {
            return self.allocate_anonymous();
        }

        let label = if label.trim().is_empty() {
            humanize_label(seed)
        } else {
            label.trim().to_string()
        };

        if self.used.insert(base.clone()) {
            return (base, label);
        }

        let mut n = 2;
        loop {
            let candidate = format!("{base}_{n}");
            if self.used.insert(candidate.clone()) {
                return (candidate, format!("{label} ({n})"));
            }
            n += 1;
        }
    }

    pub fn allocate_anonymous(&mut self) -> (String, String) {
        loop {
            self.anonymous += 1;
            let candidate = format!("placeholder_{}", self.anonymous);
            if self.used.insert(candidate.clone()) {
                return (candidate, format!("Placeholder {}", self.anonymous));
            }
        }
    }
}
