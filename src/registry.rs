//! Name registry with prefix-unique abbreviations.
//!
//! One [`Registry`] holds the top-level commands of a processor; every command
//! with subcommands owns another one. Registration refuses entries whose
//! accepted abbreviations could be confused with a sibling's, so lookup never
//! has to guess.

use std::collections::BTreeMap;

use crate::settings::SettingsProvider;

/// Something that can be registered and looked up by name.
pub trait RegistryEntry {
    /// Full name.
    fn name(&self) -> &str;

    /// Alternative names; these only match exactly.
    fn aliases(&self) -> &[&'static str] {
        &[]
    }

    /// Shortest prefix of [`name`](Self::name) accepted on lookup.
    fn min_abbrev(&self) -> usize;

    /// Whether [`Registry::list`] shows this entry.
    fn in_list(&self) -> bool {
        true
    }
}

impl<T: RegistryEntry + ?Sized> RegistryEntry for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn aliases(&self) -> &[&'static str] {
        (**self).aliases()
    }

    fn min_abbrev(&self) -> usize {
        (**self).min_abbrev()
    }

    fn in_list(&self) -> bool {
        (**self).in_list()
    }
}

/// Registration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("name {0:?} is already registered")]
    DuplicateName(String),

    #[error("{first:?} and {second:?} both accept the abbreviation {prefix:?}")]
    AmbiguousAbbreviation {
        first: String,
        second: String,
        prefix: String,
    },

    #[error("minimum abbreviation {min_abbrev} of {name:?} is longer than the name")]
    AbbreviationTooLong { name: String, min_abbrev: usize },
}

/// Lookup failures, for callers that report them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("Undefined command: \"{0}\". Try \"help\".")]
    NotFound(String),

    #[error("Ambiguous command \"{token}\": {}", .candidates.join(", "))]
    Ambiguous { token: String, candidates: Vec<String> },
}

/// Registry of entries keyed by name.
#[derive(Debug)]
pub struct Registry<E> {
    entries: BTreeMap<String, E>,
    aliases: BTreeMap<String, String>,
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn prefix(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// First prefix length both names accept, if any.
fn shared_abbreviation(a: &str, min_a: usize, b: &str, min_b: usize) -> Option<String> {
    let lo = min_a.max(min_b).max(1);
    let hi = char_len(a).min(char_len(b));
    if lo > hi {
        return None;
    }
    let pa = prefix(a, lo);
    (pa == prefix(b, lo)).then_some(pa)
}

impl<E: RegistryEntry> Registry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_taken(&self, name: &str) -> bool {
        self.entries.contains_key(name) || self.aliases.contains_key(name)
    }

    /// Add `entry`, rejecting name clashes and ambiguous abbreviations.
    pub fn register(&mut self, entry: E) -> Result<(), RegistryError> {
        let name = entry.name().to_string();
        let min_abbrev = entry.min_abbrev();
        if min_abbrev > char_len(&name) {
            return Err(RegistryError::AbbreviationTooLong { name, min_abbrev });
        }
        if self.is_taken(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        for alias in entry.aliases() {
            if *alias == name || self.is_taken(alias) {
                return Err(RegistryError::DuplicateName(alias.to_string()));
            }
        }
        for other in self.entries.values() {
            if let Some(prefix) = shared_abbreviation(&name, min_abbrev, other.name(), other.min_abbrev()) {
                return Err(RegistryError::AmbiguousAbbreviation {
                    first: other.name().to_string(),
                    second: name,
                    prefix,
                });
            }
        }

        log::debug!("registered {}", name);
        for alias in entry.aliases() {
            self.aliases.insert(alias.to_string(), name.clone());
        }
        self.entries.insert(name, entry);
        Ok(())
    }

    /// Entry with exactly this name.
    pub fn get(&self, name: &str) -> Option<&E> {
        self.entries.get(name)
    }

    fn find(&self, token: &str, min_override: Option<usize>) -> Result<&str, LookupError> {
        if let Some(entry) = self.entries.get(token) {
            return Ok(entry.name());
        }
        if let Some(name) = self.aliases.get(token) {
            return Ok(name);
        }

        let candidates: Vec<&E> = self
            .entries
            .values()
            .filter(|e| !token.is_empty() && e.name().starts_with(token))
            .collect();
        match candidates.as_slice() {
            [only] => {
                let min = min_override.unwrap_or_else(|| only.min_abbrev());
                if min <= char_len(token) {
                    Ok(only.name())
                } else {
                    Err(LookupError::NotFound(token.to_string()))
                }
            }
            [] => Err(LookupError::NotFound(token.to_string())),
            many => Err(LookupError::Ambiguous {
                token: token.to_string(),
                candidates: many.iter().map(|e| e.name().to_string()).collect(),
            }),
        }
    }

    /// Resolve `token` to an entry, explaining failures.
    pub fn resolve(&self, token: &str) -> Result<&E, LookupError> {
        let name = self.find(token, None)?;
        self.entries
            .get(name)
            .ok_or_else(|| LookupError::NotFound(token.to_string()))
    }

    /// Resolve `token`; `None` when it is unknown, too short or ambiguous.
    pub fn lookup(&self, token: &str) -> Option<&E> {
        self.resolve(token).ok()
    }

    /// Like [`lookup`](Self::lookup), but a positive `abbrev` setting replaces
    /// every entry's own minimum abbreviation.
    pub fn lookup_with(&self, token: &str, settings: &dyn SettingsProvider) -> Option<&E> {
        let min_override = settings
            .get_int("abbrev")
            .filter(|&n| n > 0)
            .map(|n| n as usize);
        let name = self.find(token, min_override).ok()?;
        self.entries.get(name)
    }

    pub fn lookup_mut(&mut self, token: &str) -> Option<&mut E> {
        let name = self.find(token, None).ok()?.to_string();
        self.entries.get_mut(&name)
    }

    /// Names of listed entries, sorted.
    pub fn list(&self) -> Vec<&str> {
        self.entries
            .values()
            .filter(|e| e.in_list())
            .map(|e| e.name())
            .collect()
    }

    /// Every entry in name order.
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use rstest::rstest;

    #[derive(Debug)]
    struct Entry {
        name: &'static str,
        aliases: &'static [&'static str],
        min_abbrev: usize,
        in_list: bool,
    }

    impl Entry {
        fn new(name: &'static str, min_abbrev: usize) -> Self {
            Self {
                name,
                aliases: &[],
                min_abbrev,
                in_list: true,
            }
        }
    }

    impl RegistryEntry for Entry {
        fn name(&self) -> &str {
            self.name
        }

        fn aliases(&self) -> &[&'static str] {
            self.aliases
        }

        fn min_abbrev(&self) -> usize {
            self.min_abbrev
        }

        fn in_list(&self) -> bool {
            self.in_list
        }
    }

    fn skip_registry() -> Registry<Entry> {
        let mut reg = Registry::new();
        reg.register(Entry::new("skip", 2)).unwrap();
        reg.register(Entry::new("skipclass", 5)).unwrap();
        reg
    }

    #[rstest]
    #[case("sk", None)]
    #[case("ski", None)]
    #[case("skip", Some("skip"))]
    #[case("skipc", Some("skipclass"))]
    #[case("skipclass", Some("skipclass"))]
    #[case("skipclassX", None)]
    #[case("", None)]
    fn test_skip_abbreviations(#[case] token: &str, #[case] expected: Option<&str>) {
        let reg = skip_registry();
        assert_eq!(reg.lookup(token).map(|e| e.name), expected);
    }

    #[rstest]
    #[case("tes", None)]
    #[case("test", Some("testing"))]
    #[case("testing", Some("testing"))]
    #[case("testing1", None)]
    fn test_single_subcommand_lookup(#[case] token: &str, #[case] expected: Option<&str>) {
        let mut reg = Registry::new();
        reg.register(Entry::new("testing", 4)).unwrap();
        assert_eq!(reg.lookup(token).map(|e| e.name), expected);
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let mut reg = Registry::new();
        reg.register(Entry::new("testing", 4)).unwrap();
        assert_eq!(reg.list(), vec!["testing"]);
        reg.register(Entry::new("foobar", 1)).unwrap();
        reg.register(Entry {
            in_list: false,
            ..Entry::new("hidden", 6)
        })
        .unwrap();
        assert_eq!(reg.list(), vec!["foobar", "testing"]);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_aliases_match_exactly() {
        let mut reg = Registry::new();
        reg.register(Entry {
            aliases: &["disasm"],
            ..Entry::new("disassemble", 11)
        })
        .unwrap();
        assert_eq!(reg.lookup("disasm").map(|e| e.name), Some("disassemble"));
        assert!(reg.lookup("disas").is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut reg = skip_registry();
        assert_eq!(
            reg.register(Entry::new("skip", 4)).unwrap_err(),
            RegistryError::DuplicateName("skip".into())
        );
        assert!(matches!(
            reg.register(Entry {
                aliases: &["skipclass"],
                ..Entry::new("other", 5)
            }),
            Err(RegistryError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_ambiguous_abbreviation_rejected() {
        let mut reg = Registry::new();
        reg.register(Entry::new("different", 3)).unwrap();
        let err = reg.register(Entry::new("difference", 2)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::AmbiguousAbbreviation {
                first: "different".into(),
                second: "difference".into(),
                prefix: "dif".into(),
            }
        );
        // a longer minimum that still fits inside the common prefix is ambiguous too
        assert!(reg.register(Entry::new("diffuse", 4)).is_err());
        reg.register(Entry::new("display", 2)).unwrap();
        assert!(reg.lookup("di").is_none());
        assert_eq!(reg.lookup("dis").map(|e| e.name), Some("display"));
    }

    #[test]
    fn test_min_abbrev_longer_than_name() {
        let mut reg = Registry::new();
        assert!(matches!(
            reg.register(Entry::new("up", 3)),
            Err(RegistryError::AbbreviationTooLong { .. })
        ));
    }

    #[test]
    fn test_resolve_reports_candidates() {
        let reg = skip_registry();
        match reg.resolve("sk") {
            Err(LookupError::Ambiguous { candidates, .. }) => {
                assert_eq!(candidates, vec!["skip", "skipclass"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(reg.resolve("zzz").unwrap_err(), LookupError::NotFound("zzz".into()));
    }

    #[test]
    fn test_lookup_with_abbrev_setting() {
        let mut reg = Registry::new();
        reg.register(Entry::new("testing", 4)).unwrap();
        let mut settings = Settings::default();
        assert!(reg.lookup_with("te", &settings).is_none());
        settings.abbrev = Some(2);
        assert_eq!(reg.lookup_with("te", &settings).map(|e| e.name), Some("testing"));
        assert!(reg.lookup_with("t", &settings).is_none());
    }
}
