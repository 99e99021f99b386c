use super::ResultMapping;

use indexmap::IndexMap;

/// Selects a sub-result-map per row from a column value.
///
/// Cases map a discriminating value to a result-map id; resolution loops at
/// row time with a visited-set so case chains terminate even when they
/// cycle.
#[derive(Debug, Clone)]
pub struct Discriminator {
    mapping: ResultMapping,
    cases: IndexMap<String, String>,
}

impl Discriminator {
    pub fn builder(mapping: ResultMapping) -> DiscriminatorBuilder {
        DiscriminatorBuilder {
            mapping,
            cases: IndexMap::new(),
        }
    }

    /// The column mapping whose value discriminates.
    pub fn mapping(&self) -> &ResultMapping {
        &self.mapping
    }

    pub fn cases(&self) -> &IndexMap<String, String> {
        &self.cases
    }

    /// The result-map id for a discriminating value, if a case covers it.
    pub fn resolve(&self, value: &str) -> Option<&str> {
        self.cases.get(value).map(String::as_str)
    }
}

pub struct DiscriminatorBuilder {
    mapping: ResultMapping,
    cases: IndexMap<String, String>,
}

impl DiscriminatorBuilder {
    pub fn case(mut self, value: impl Into<String>, result_map_id: impl Into<String>) -> Self {
        self.cases.insert(value.into(), result_map_id.into());
        self
    }

    pub fn build(self) -> Discriminator {
        Discriminator {
            mapping: self.mapping,
            cases: self.cases,
        }
    }
}
