use crate::{Error, Result};

use indexmap::IndexMap;

/// A registry map that fails loudly: duplicate ids are rejected at
/// registration, lookups of unknown ids name the store, and a dotted id
/// also registers its short form — unless two namespaces claim the same
/// short name, in which case the short lookup reports the ambiguity.
pub struct StrictMap<V> {
    name: &'static str,
    entries: IndexMap<String, V>,
    shorts: IndexMap<String, ShortEntry>,
}

enum ShortEntry {
    Unique(String),
    Ambiguous(Vec<String>),
}

impl<V: Clone> StrictMap<V> {
    pub fn new(name: &'static str) -> StrictMap<V> {
        StrictMap {
            name,
            entries: IndexMap::new(),
            shorts: IndexMap::new(),
        }
    }

    pub fn put(&mut self, key: String, value: V) -> Result<()> {
        if self.entries.contains_key(&key) {
            return Err(Error::parse(format!(
                "{} already contains `{key}`",
                self.name
            )));
        }

        if let Some(short) = key.rsplit('.').next().filter(|short| *short != key) {
            match self.shorts.get_mut(short) {
                None => {
                    self.shorts
                        .insert(short.to_string(), ShortEntry::Unique(key.clone()));
                }
                Some(ShortEntry::Unique(existing)) => {
                    let candidates = vec![existing.clone(), key.clone()];
                    self.shorts
                        .insert(short.to_string(), ShortEntry::Ambiguous(candidates));
                }
                Some(ShortEntry::Ambiguous(candidates)) => candidates.push(key.clone()),
            }
        }

        self.entries.insert(key, value);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        if self.entries.contains_key(key) {
            return true;
        }
        matches!(self.shorts.get(key), Some(ShortEntry::Unique(_)))
    }

    pub fn get(&self, key: &str) -> Result<V> {
        if let Some(value) = self.entries.get(key) {
            return Ok(value.clone());
        }
        match self.shorts.get(key) {
            Some(ShortEntry::Unique(full)) => Ok(self.entries[full].clone()),
            Some(ShortEntry::Ambiguous(candidates)) => Err(Error::parse(format!(
                "`{key}` is ambiguous in {} (candidates: {})",
                self.name,
                candidates.join(", ")
            ))),
            None => Err(Error::parse(format!(
                "{} does not contain `{key}`",
                self.name
            ))),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_resolve_when_unique() {
        let mut map = StrictMap::new("test registry");
        map.put("app.UserMapper.findById".to_string(), 1).unwrap();

        assert_eq!(map.get("app.UserMapper.findById").unwrap(), 1);
        assert_eq!(map.get("findById").unwrap(), 1);
    }

    #[test]
    fn colliding_short_names_report_candidates() {
        let mut map = StrictMap::new("test registry");
        map.put("app.A.find".to_string(), 1).unwrap();
        map.put("app.B.find".to_string(), 2).unwrap();

        assert_eq!(map.get("app.A.find").unwrap(), 1);
        let err = map.get("find").unwrap_err();
        assert!(err.to_string().contains("app.A.find"));
        assert!(err.to_string().contains("app.B.find"));
        assert!(!map.contains("find"));
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut map = StrictMap::new("test registry");
        map.put("x".to_string(), 1).unwrap();
        assert!(map.put("x".to_string(), 2).is_err());
    }

    #[test]
    fn missing_keys_name_the_store() {
        let map: StrictMap<i32> = StrictMap::new("test registry");
        assert!(map.get("nope").unwrap_err().to_string().contains("test registry"));
    }
}
