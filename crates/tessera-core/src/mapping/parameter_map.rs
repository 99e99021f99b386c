use super::ParameterMapping;

/// A named, reusable list of parameter mappings declared with
/// `<parameterMap>`. Inline `#{...}` parameters compile to an anonymous one.
#[derive(Debug, Clone)]
pub struct ParameterMap {
    id: String,
    mappings: Vec<ParameterMapping>,
}

impl ParameterMap {
    pub fn new(id: impl Into<String>, mappings: Vec<ParameterMapping>) -> ParameterMap {
        ParameterMap {
            id: id.into(),
            mappings,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mappings(&self) -> &[ParameterMapping] {
        &self.mappings
    }
}
