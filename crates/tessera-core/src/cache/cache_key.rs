use crate::Value;

use std::hash::{Hash, Hasher};

const DEFAULT_MULTIPLIER: i64 = 37;
const DEFAULT_HASHCODE: i64 = 17;

/// A composite key accumulated from the identifying inputs of a query:
/// statement id, row bounds, final SQL text, every parameter value, and the
/// environment id.
///
/// Two logically-identical calls accumulate equal keys; any differing input
/// diverges the running hash, the checksum, or the retained part list.
#[derive(Debug, Clone, Default)]
pub struct CacheKey {
    hashcode: i64,
    checksum: i64,
    parts: Vec<Value>,
}

impl CacheKey {
    pub fn new() -> CacheKey {
        CacheKey {
            hashcode: DEFAULT_HASHCODE,
            checksum: 0,
            parts: Vec::new(),
        }
    }

    pub fn update(&mut self, part: impl Into<Value>) {
        let part = part.into();
        let base = value_hash(&part).wrapping_mul(self.parts.len() as i64 + 1);

        self.checksum = self.checksum.wrapping_add(base);
        self.hashcode = DEFAULT_MULTIPLIER
            .wrapping_mul(self.hashcode)
            .wrapping_add(base);
        self.parts.push(part);
    }

    pub fn update_all(&mut self, parts: impl IntoIterator<Item = Value>) {
        for part in parts {
            self.update(part);
        }
    }

    /// Derives a key scoped under a parent key, grouping nested rows per
    /// parent object.
    pub fn combine(&self, parent: &CacheKey) -> CacheKey {
        let mut combined = self.clone();
        combined.update(Value::Long(parent.hashcode));
        combined.update(Value::Long(parent.checksum));
        combined
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

fn value_hash(value: &Value) -> i64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish() as i64
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &CacheKey) -> bool {
        self.hashcode == other.hashcode
            && self.checksum == other.checksum
            && self.parts == other.parts
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hashcode.hash(state);
    }
}

impl core::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}:{}", self.hashcode, self.checksum)?;
        for part in &self.parts {
            write!(f, ":{part}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_for(parts: &[Value]) -> CacheKey {
        let mut key = CacheKey::new();
        for part in parts {
            key.update(part.clone());
        }
        key
    }

    #[test]
    fn equal_inputs_equal_keys() {
        let parts = [
            Value::String("app.UserMapper.findById".into()),
            Value::Long(0),
            Value::Long(usize::MAX as i64),
            Value::String("SELECT * FROM users WHERE id = ?".into()),
            Value::Long(7),
        ];
        assert_eq!(key_for(&parts), key_for(&parts));
    }

    #[test]
    fn different_inputs_diverge() {
        let a = key_for(&[Value::Long(1), Value::Long(2)]);
        let b = key_for(&[Value::Long(2), Value::Long(1)]);
        let c = key_for(&[Value::Long(1)]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn renders_parts() {
        let key = key_for(&[Value::String("id".into()), Value::Long(3)]);
        let rendered = key.to_string();
        assert!(rendered.ends_with(":id:3"));
    }
}
