use super::{Discriminator, ResultMapping};
use crate::ty::ValueKind;
use crate::{Error, Result};

use std::collections::HashSet;

/// A declarative mapping from result columns to a target shape, with the
/// mapping list partitioned by role and the column/property sets
/// precomputed for auto-mapping.
#[derive(Debug, Clone)]
pub struct ResultMap {
    id: String,
    type_name: String,
    value_kind: ValueKind,
    mappings: Vec<ResultMapping>,
    id_mappings: Vec<ResultMapping>,
    constructor_mappings: Vec<ResultMapping>,
    property_mappings: Vec<ResultMapping>,
    mapped_columns: HashSet<String>,
    mapped_properties: HashSet<String>,
    discriminator: Option<Discriminator>,
    has_nested_result_maps: bool,
    has_nested_queries: bool,
    auto_mapping: Option<bool>,
}

impl ResultMap {
    pub fn builder(
        id: impl Into<String>,
        type_name: impl Into<String>,
        value_kind: ValueKind,
    ) -> ResultMapBuilder {
        ResultMapBuilder {
            id: id.into(),
            type_name: type_name.into(),
            value_kind,
            mappings: vec![],
            discriminator: None,
            auto_mapping: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }

    /// Every mapping, in declaration order.
    pub fn mappings(&self) -> &[ResultMapping] {
        &self.mappings
    }

    /// Mappings flagged `Id`; empty when the map declares none.
    pub fn id_mappings(&self) -> &[ResultMapping] {
        &self.id_mappings
    }

    pub fn constructor_mappings(&self) -> &[ResultMapping] {
        &self.constructor_mappings
    }

    /// Non-constructor mappings, including id mappings.
    pub fn property_mappings(&self) -> &[ResultMapping] {
        &self.property_mappings
    }

    /// Uppercased column names claimed by declared mappings (composite and
    /// prefix-combined columns included).
    pub fn mapped_columns(&self) -> &HashSet<String> {
        &self.mapped_columns
    }

    pub fn mapped_properties(&self) -> &HashSet<String> {
        &self.mapped_properties
    }

    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    pub fn has_nested_result_maps(&self) -> bool {
        self.has_nested_result_maps
    }

    pub fn has_nested_queries(&self) -> bool {
        self.has_nested_queries
    }

    pub fn auto_mapping(&self) -> Option<bool> {
        self.auto_mapping
    }
}

pub struct ResultMapBuilder {
    id: String,
    type_name: String,
    value_kind: ValueKind,
    mappings: Vec<ResultMapping>,
    discriminator: Option<Discriminator>,
    auto_mapping: Option<bool>,
}

impl ResultMapBuilder {
    pub fn mapping(mut self, mapping: ResultMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    pub fn mappings(mut self, mappings: Vec<ResultMapping>) -> Self {
        self.mappings.extend(mappings);
        self
    }

    pub fn discriminator(mut self, discriminator: Option<Discriminator>) -> Self {
        self.discriminator = discriminator;
        self
    }

    pub fn auto_mapping(mut self, auto_mapping: Option<bool>) -> Self {
        self.auto_mapping = auto_mapping;
        self
    }

    pub fn build(self) -> Result<ResultMap> {
        if self.id.is_empty() {
            return Err(Error::parse("result map id is required"));
        }

        let mut id_mappings = vec![];
        let mut constructor_mappings = vec![];
        let mut property_mappings = vec![];
        let mut mapped_columns = HashSet::new();
        let mut mapped_properties = HashSet::new();
        let mut has_nested_result_maps = false;
        let mut has_nested_queries = false;

        for mapping in &self.mappings {
            has_nested_queries |= mapping.nested_query_id().is_some();
            has_nested_result_maps |=
                mapping.nested_result_map_id().is_some() && mapping.result_set().is_none();

            for column in mapping
                .composites()
                .iter()
                .chain(Some(mapping))
                .filter_map(ResultMapping::column)
            {
                mapped_columns.insert(column.to_uppercase());
            }

            if let Some(property) = mapping.property() {
                mapped_properties.insert(property.to_string());
            }

            if mapping.is_constructor() {
                constructor_mappings.push(mapping.clone());
            } else {
                property_mappings.push(mapping.clone());
            }
            if mapping.is_id() {
                id_mappings.push(mapping.clone());
            }
        }

        Ok(ResultMap {
            id: self.id,
            type_name: self.type_name,
            value_kind: self.value_kind,
            mappings: self.mappings,
            id_mappings,
            constructor_mappings,
            property_mappings,
            mapped_columns,
            mapped_properties,
            discriminator: self.discriminator,
            has_nested_result_maps,
            has_nested_queries,
            auto_mapping: self.auto_mapping,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ResultFlag;

    fn mapping(property: &str, column: &str, flags: Vec<ResultFlag>) -> ResultMapping {
        ResultMapping::builder()
            .property(property)
            .column(Some(column.to_string()))
            .flags(flags)
            .build()
    }

    #[test]
    fn partitions_by_role() {
        let map = ResultMap::builder("userResult", "user", ValueKind::Object)
            .mapping(mapping("id", "id", vec![ResultFlag::Id]))
            .mapping(mapping("name", "user_name", vec![]))
            .mapping(mapping("kind", "kind", vec![ResultFlag::Constructor]))
            .build()
            .unwrap();

        assert_eq!(map.id_mappings().len(), 1);
        assert_eq!(map.constructor_mappings().len(), 1);
        assert_eq!(map.property_mappings().len(), 2);
        assert!(map.mapped_columns().contains("USER_NAME"));
        assert!(map.mapped_properties().contains("name"));
        assert!(!map.has_nested_result_maps());
    }

    #[test]
    fn nested_flags() {
        let nested = ResultMapping::builder()
            .property("addresses")
            .nested_result_map_id(Some("addressResult".to_string()))
            .build();
        let map = ResultMap::builder("userResult", "user", ValueKind::Object)
            .mapping(nested)
            .build()
            .unwrap();
        assert!(map.has_nested_result_maps());

        let linked = ResultMapping::builder()
            .property("orders")
            .nested_result_map_id(Some("orderResult".to_string()))
            .result_set(Some("orders".to_string()))
            .build();
        let map = ResultMap::builder("userResult", "user", ValueKind::Object)
            .mapping(linked)
            .build()
            .unwrap();
        // resultSet-linked mappings project from another result set, so they
        // do not force the nested-join row grouping path
        assert!(!map.has_nested_result_maps());
    }
}
