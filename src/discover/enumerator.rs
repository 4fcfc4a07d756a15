use ahash::AHashSet;
use std::slice;

use crate::target::{Scheme, Target};

/// Where enumeration starts: the root domain first, then any hosts
/// discovered by an earlier round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    bases: Vec<String>,
}

impl Seed {
    pub fn domain(domain: impl Into<String>) -> Self {
        Self { bases: vec![domain.into()] }
    }

    /// Root domain plus discovered subdomains, in that order. Repeats are dropped.
    pub fn with_discovered(domain: impl Into<String>, discovered: impl IntoIterator<Item = String>) -> Self {
        let mut bases = vec![domain.into()];
        for host in discovered {
            if !bases.contains(&host) {
                bases.push(host);
            }
        }
        Self { bases }
    }

    pub fn bases(&self) -> &[String] {
        &self.bases
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// `label + "." + base` for every wordlist label.
    Subdomain,
    /// `scheme://base/word` for every word, scheme and base.
    Path { schemes: Vec<Scheme> },
}

/// Lazily generate candidate targets. Pure: nothing is fetched or resolved here.
///
/// Ordering is part of the contract: wordlist order first, then scheme
/// order, then base order.
pub fn enumerate<'a>(seed: &'a Seed, wordlist: &'a [String], mode: &'a Mode) -> Candidates<'a> {
    let inner = match mode {
        Mode::Subdomain => Inner::Subdomain {
            labels: wordlist.iter(),
            bases: &seed.bases,
            label: None,
            base_idx: 0,
            seen: AHashSet::new(),
        },
        Mode::Path { schemes } => Inner::Path {
            words: wordlist,
            schemes,
            bases: &seed.bases,
            next: 0,
        },
    };
    Candidates { inner }
}

/// Finite, single-pass sequence of targets. Call [`enumerate`] again to restart.
pub struct Candidates<'a> {
    inner: Inner<'a>,
}

enum Inner<'a> {
    Subdomain {
        labels: slice::Iter<'a, String>,
        bases: &'a [String],
        label: Option<&'a str>,
        base_idx: usize,
        seen: AHashSet<String>,
    },
    Path {
        words: &'a [String],
        schemes: &'a [Scheme],
        bases: &'a [String],
        next: usize,
    },
}

impl<'a> Iterator for Candidates<'a> {
    type Item = Target;

    fn next(&mut self) -> Option<Target> {
        match &mut self.inner {
            Inner::Subdomain { labels, bases, label, base_idx, seen } => loop {
                if bases.is_empty() {
                    return None;
                }
                let current = match (*label, *base_idx < bases.len()) {
                    (Some(l), true) => l,
                    _ => {
                        let l = labels.next()?.trim();
                        *base_idx = 0;
                        if l.is_empty() {
                            *label = None;
                            continue;
                        }
                        *label = Some(l);
                        l
                    }
                };
                let host = format!("{}.{}", current, bases[*base_idx]);
                *base_idx += 1;
                if seen.insert(host.clone()) {
                    return Some(Target::new(host));
                }
            },
            Inner::Path { words, schemes, bases, next } => {
                let per_word = schemes.len() * bases.len();
                if per_word == 0 || *next >= words.len() * per_word {
                    return None;
                }
                let w = *next / per_word;
                let s = (*next / bases.len()) % schemes.len();
                let b = *next % bases.len();
                *next += 1;
                Some(Target::new(format!(
                    "{}://{}/{}",
                    schemes[s],
                    bases[b].trim_end_matches('/'),
                    words[w].trim()
                )))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            Inner::Subdomain { labels, bases, .. } => (0, Some(labels.len().saturating_mul(bases.len()) + bases.len())),
            Inner::Path { words, schemes, bases, next } => {
                let left = (words.len() * schemes.len() * bases.len()).saturating_sub(*next);
                (left, Some(left))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn subdomains_follow_wordlist_order() {
        let seed = Seed::domain("example.com");
        let wl = words(&["www", "mail", "ftp"]);
        let got: Vec<String> = enumerate(&seed, &wl, &Mode::Subdomain).map(|t| t.to_string()).collect();
        assert_eq!(got, vec!["www.example.com", "mail.example.com", "ftp.example.com"]);
    }

    #[test]
    fn subdomains_skip_duplicate_labels() {
        let seed = Seed::domain("example.com");
        let wl = words(&["www", "mail", "www", "mail", "vpn"]);
        let got: Vec<String> = enumerate(&seed, &wl, &Mode::Subdomain).map(|t| t.to_string()).collect();
        assert_eq!(got, vec!["www.example.com", "mail.example.com", "vpn.example.com"]);
    }

    #[test]
    fn path_mode_nests_word_then_scheme_then_base() {
        let seed = Seed::with_discovered("example.com", vec!["www.example.com".to_string()]);
        let wl = words(&["admin", " login "]);
        let mode = Mode::Path { schemes: vec![Scheme::Http, Scheme::Https] };
        let got: Vec<String> = enumerate(&seed, &wl, &mode).map(|t| t.to_string()).collect();
        assert_eq!(
            got,
            vec![
                "http://example.com/admin",
                "http://www.example.com/admin",
                "https://example.com/admin",
                "https://www.example.com/admin",
                "http://example.com/login",
                "http://www.example.com/login",
                "https://example.com/login",
                "https://www.example.com/login",
            ]
        );
    }

    #[test]
    fn path_mode_size_is_exact() {
        let seed = Seed::with_discovered("a.com", vec!["b.a.com".into(), "c.a.com".into()]);
        let wl = words(&["x", "y", "z", "x"]);
        let mode = Mode::Path { schemes: vec![Scheme::Http, Scheme::Https] };
        let it = enumerate(&seed, &wl, &mode);
        assert_eq!(it.size_hint(), (24, Some(24)));
        assert_eq!(it.count(), 3 * 2 * 4);
    }

    #[test]
    fn fresh_call_restarts() {
        let seed = Seed::domain("example.com");
        let wl = words(&["a", "b"]);
        let mut first = enumerate(&seed, &wl, &Mode::Subdomain);
        first.next();
        assert_eq!(enumerate(&seed, &wl, &Mode::Subdomain).count(), 2);
    }

    #[test]
    fn empty_inputs_yield_nothing() {
        let seed = Seed::domain("example.com");
        let empty: Vec<String> = Vec::new();
        assert_eq!(enumerate(&seed, &empty, &Mode::Subdomain).count(), 0);
        let mode = Mode::Path { schemes: Vec::new() };
        assert_eq!(enumerate(&seed, &words(&["a"]), &mode).count(), 0);
    }
}
