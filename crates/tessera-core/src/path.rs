use crate::{Error, Result};

/// A parsed dotted/indexed property expression, e.g. `orders[2].lines[0].sku`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    segments: Vec<PathSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSegment {
    pub name: String,
    pub index: Option<PathIndex>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathIndex {
    /// `items[3]`
    Position(usize),
    /// `attrs[color]`
    Key(String),
}

impl PropertyPath {
    pub fn parse(raw: &str) -> Result<PropertyPath> {
        if raw.is_empty() {
            return Err(Error::reflection("empty property path"));
        }

        let mut segments = Vec::new();
        for part in raw.split('.') {
            segments.push(PathSegment::parse(part, raw)?);
        }

        Ok(PropertyPath { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The first segment name, which decides binding-map vs parameter-object
    /// resolution.
    pub fn head(&self) -> &PathSegment {
        &self.segments[0]
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl PathSegment {
    fn parse(part: &str, raw: &str) -> Result<PathSegment> {
        let (name, index) = match part.find('[') {
            None => (part, None),
            Some(open) => {
                let Some(stripped) = part[open + 1..].strip_suffix(']') else {
                    return Err(Error::reflection(format!(
                        "unterminated index in property path `{raw}`"
                    )));
                };
                (&part[..open], Some(stripped))
            }
        };

        if name.is_empty() {
            return Err(Error::reflection(format!(
                "empty segment in property path `{raw}`"
            )));
        }

        let index = match index {
            None => None,
            Some("") => {
                return Err(Error::reflection(format!(
                    "empty index in property path `{raw}`"
                )))
            }
            Some(idx) => Some(match idx.parse::<usize>() {
                Ok(position) => PathIndex::Position(position),
                Err(_) => PathIndex::Key(idx.trim_matches('\'').to_string()),
            }),
        };

        Ok(PathSegment {
            name: name.to_string(),
            index,
        })
    }
}

impl core::fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(&segment.name)?;
            match &segment.index {
                Some(PathIndex::Position(position)) => write!(f, "[{position}]")?,
                Some(PathIndex::Key(key)) => write!(f, "[{key}]")?,
                None => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_path() {
        let path = PropertyPath::parse("user.address.city").unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.segments()[1].name, "address");
        assert!(path.segments()[1].index.is_none());
    }

    #[test]
    fn indexed_path() {
        let path = PropertyPath::parse("orders[2].lines[0].sku").unwrap();
        assert_eq!(path.segments()[0].index, Some(PathIndex::Position(2)));
        assert_eq!(path.segments()[1].index, Some(PathIndex::Position(0)));
        assert_eq!(path.segments()[2].index, None);
    }

    #[test]
    fn keyed_index() {
        let path = PropertyPath::parse("attrs[color]").unwrap();
        assert_eq!(
            path.segments()[0].index,
            Some(PathIndex::Key("color".to_string()))
        );
    }

    #[test]
    fn round_trips_through_display() {
        for raw in ["a", "a.b", "a[0].b", "m[key].v"] {
            assert_eq!(PropertyPath::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn rejects_malformed() {
        assert!(PropertyPath::parse("").is_err());
        assert!(PropertyPath::parse("a..b").is_err());
        assert!(PropertyPath::parse("a[1.b").is_err());
        assert!(PropertyPath::parse("a[]").is_err());
    }
}
