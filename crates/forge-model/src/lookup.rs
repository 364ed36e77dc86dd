use std::collections::HashMap;

/// Case-insensitive name index preserving the first-seen original spelling.
///
/// Source exports disagree on column-name casing, so every column resolution
/// in the pipeline goes through one of these instead of comparing raw names.
#[derive(Debug, Clone, Default)]
pub struct CaseInsensitiveLookup {
    map: HashMap<String, String>,
}

impl CaseInsensitiveLookup {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = HashMap::new();
        for name in names {
            let name = name.as_ref();
            let key = name.to_ascii_uppercase();
            map.entry(key).or_insert_with(|| name.to_string());
        }
        Self { map }
    }

    /// The original spelling stored for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map
            .get(&name.to_ascii_uppercase())
            .map(|value| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(&name.to_ascii_uppercase())
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_regardless_of_case() {
        let lookup = CaseInsensitiveLookup::new(["SubjID", "VISIT"]);
        assert_eq!(lookup.get("SUBJID"), Some("SubjID"));
        assert_eq!(lookup.get("subjid"), Some("SubjID"));
        assert!(lookup.contains("visit"));
        assert!(lookup.get("SITEID").is_none());
    }

    #[test]
    fn first_spelling_wins() {
        let lookup = CaseInsensitiveLookup::new(["Visit", "VISIT"]);
        assert_eq!(lookup.get("visit"), Some("Visit"));
    }
}
