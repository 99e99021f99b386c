use super::ResultSetWrapper;

use tessera_core::cache::CacheKey;
use tessera_core::config::{AutoMappingBehavior, Configuration};
use tessera_core::driver::{ResultSetType, Statement};
use tessera_core::exec::{
    Executor, ResultContext, ResultHandler, ResultSetHandler, RowBounds, RowHandle,
};
use tessera_core::mapping::{
    BoundSql, MappedStatement, ParamMode, ResultMap, ResultMapping,
};
use tessera_core::meta::{camel_case, MetaValueMut};
use tessera_core::ty::ValueKind;
use tessera_core::value::{LazyLoad, ProxyRef};
use tessera_core::{Error, Result, Value};

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::trace;

/// Projects driver rows into objects: declared mappings through type
/// handlers, automatic column→property mapping, discriminator resolution
/// per row, nested result maps grouped by row keys, nested queries
/// (deferred or lazy), and cross-result-set linking.
pub struct RowProjector {
    config: Arc<Configuration>,
    ms: Arc<MappedStatement>,
    parameter: Value,
    bound_sql: BoundSql,
    row_bounds: RowBounds,
    /// Partially-built objects of the current result set, keyed by
    /// combined row key.
    nested_result_objects: HashMap<CacheKey, RowHandle>,
    /// Objects currently on the construction stack, keyed by result-map
    /// id, used to link circular references instead of recursing.
    ancestor_objects: IndexMap<String, RowHandle>,
    /// Parents waiting for rows of a named future result set.
    pending_relations: HashMap<CacheKey, Vec<PendingRelation>>,
    /// Result-set name → the mapping that awaits it.
    next_result_maps: HashMap<String, ResultMapping>,
}

#[derive(Clone)]
struct PendingRelation {
    parent: RowHandle,
    mapping: ResultMapping,
}

impl RowProjector {
    pub fn new(
        config: Arc<Configuration>,
        ms: Arc<MappedStatement>,
        parameter: Value,
        bound_sql: BoundSql,
        row_bounds: RowBounds,
    ) -> RowProjector {
        RowProjector {
            config,
            ms,
            parameter,
            bound_sql,
            row_bounds,
            nested_result_objects: HashMap::new(),
            ancestor_objects: IndexMap::new(),
            pending_relations: HashMap::new(),
            next_result_maps: HashMap::new(),
        }
    }
}

impl ResultSetHandler for RowProjector {
    fn handle_result_sets(
        &mut self,
        executor: &mut dyn Executor,
        stmt: &mut dyn Statement,
        mut result_handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<RowHandle>> {
        let result_maps = self.ms.result_maps().to_vec();
        let result_set_names = self.ms.result_sets().to_vec();
        let mut results: Vec<Vec<RowHandle>> = Vec::new();
        let mut rs_count = 0usize;

        let mut next = stmt.result_set()?;
        while let Some(rs) = next {
            let mut wrapper = ResultSetWrapper::new(rs);
            if let Some(map) = result_maps.get(rs_count).cloned() {
                let mut list = Vec::new();
                let handler = if rs_count == 0 {
                    result_handler.take()
                } else {
                    None
                };
                self.handle_result_set(executor, &mut wrapper, &map, &mut list, handler)?;
                results.push(list);
            } else if let Some(name) = result_set_names.get(rs_count) {
                if let Some(parent_mapping) = self.next_result_maps.get(name).cloned() {
                    let nested_id = parent_mapping.nested_result_map_id().ok_or_else(|| {
                        Error::parse(format!(
                            "mapping for result set `{name}` declares no result map"
                        ))
                    })?;
                    let map = self.config.result_map(nested_id)?;
                    self.handle_linked_result_set(executor, &mut wrapper, &map, &parent_mapping)?;
                }
            }
            rs_count += 1;
            next = stmt.result_set()?;
        }

        self.nested_result_objects.clear();

        Ok(match results.len() {
            0 => vec![],
            1 => results.swap_remove(0),
            // Multi-result-set procedures yield one list per result set.
            _ => results
                .into_iter()
                .map(|list| {
                    RowHandle::new(Value::List(
                        list.iter().map(RowHandle::value).collect(),
                    ))
                })
                .collect(),
        })
    }

    fn handle_output_parameters(
        &mut self,
        _executor: &mut dyn Executor,
        stmt: &mut dyn Statement,
    ) -> Result<()> {
        for (i, mapping) in self.bound_sql.parameter_mappings().iter().enumerate() {
            if !matches!(mapping.mode(), ParamMode::Out | ParamMode::InOut) {
                continue;
            }
            let value = stmt.out_value(i + 1)?;
            if self.parameter.is_object() || self.parameter.is_null() {
                MetaValueMut::new(&mut self.parameter).set(mapping.property(), value)?;
            }
        }
        Ok(())
    }

    fn parameter(&self) -> &Value {
        &self.parameter
    }
}

impl RowProjector {
    fn handle_result_set(
        &mut self,
        executor: &mut dyn Executor,
        wrapper: &mut ResultSetWrapper,
        map: &Arc<ResultMap>,
        collector: &mut Vec<RowHandle>,
        result_handler: Option<&mut dyn ResultHandler>,
    ) -> Result<()> {
        if map.has_nested_result_maps() {
            if self.config.settings().safe_row_bounds_enabled && !self.row_bounds.is_default() {
                return Err(Error::executor(
                    "row bounds cannot be combined with nested result maps when safeRowBoundsEnabled",
                ));
            }
            self.handle_rows_nested(executor, wrapper, map, collector, result_handler)
        } else {
            self.handle_rows_simple(executor, wrapper, map, collector, result_handler)
        }
    }

    fn skip_rows(&self, wrapper: &mut ResultSetWrapper) -> Result<()> {
        if self.row_bounds.offset == 0 {
            return Ok(());
        }
        if wrapper.result_set_type() != ResultSetType::ForwardOnly {
            wrapper.seek(self.row_bounds.offset)
        } else {
            for _ in 0..self.row_bounds.offset {
                if !wrapper.next()? {
                    break;
                }
            }
            Ok(())
        }
    }

    fn store(
        &self,
        handle: RowHandle,
        collector: &mut Vec<RowHandle>,
        result_handler: &mut Option<&mut dyn ResultHandler>,
        context: &mut ResultContext,
    ) {
        context.next(handle.value());
        match result_handler {
            Some(handler) => handler.handle_result(context),
            None => collector.push(handle),
        }
    }

    fn handle_rows_simple(
        &mut self,
        executor: &mut dyn Executor,
        wrapper: &mut ResultSetWrapper,
        map: &Arc<ResultMap>,
        collector: &mut Vec<RowHandle>,
        mut result_handler: Option<&mut dyn ResultHandler>,
    ) -> Result<()> {
        self.skip_rows(wrapper)?;
        let mut context = ResultContext::default();

        while context.result_count() < self.row_bounds.limit
            && !context.is_stopped()
            && wrapper.next()?
        {
            let resolved = self.resolve_discriminator(wrapper, map.clone(), None)?;
            let handle = self.row_value_simple(executor, wrapper, &resolved, None)?;
            self.register_pending_children(wrapper, &resolved, &handle)?;
            self.store(handle, collector, &mut result_handler, &mut context);
        }
        Ok(())
    }

    fn handle_rows_nested(
        &mut self,
        executor: &mut dyn Executor,
        wrapper: &mut ResultSetWrapper,
        map: &Arc<ResultMap>,
        collector: &mut Vec<RowHandle>,
        mut result_handler: Option<&mut dyn ResultHandler>,
    ) -> Result<()> {
        self.skip_rows(wrapper)?;
        let mut context = ResultContext::default();
        let mut previous: Option<RowHandle> = None;

        while context.result_count() < self.row_bounds.limit
            && !context.is_stopped()
            && wrapper.next()?
        {
            let resolved = self.resolve_discriminator(wrapper, map.clone(), None)?;
            let row_key = self.create_row_key(wrapper, &resolved, None)?;
            let partial = row_key
                .as_ref()
                .and_then(|key| self.nested_result_objects.get(key).cloned());

            match partial {
                Some(partial) => {
                    self.row_value_nested(executor, wrapper, &resolved, row_key, None, Some(partial))?;
                }
                None => {
                    // Ordered results flush the finished group as soon as a
                    // new one begins, keeping the grouping table small.
                    if self.ms.result_ordered() {
                        if let Some(finished) = previous.take() {
                            self.nested_result_objects.clear();
                            self.store(finished, collector, &mut result_handler, &mut context);
                        }
                    }

                    let handle = self.row_value_nested(
                        executor,
                        wrapper,
                        &resolved,
                        row_key.clone(),
                        None,
                        None,
                    )?;
                    if let Some(key) = row_key {
                        self.nested_result_objects.insert(key, handle.clone());
                    }
                    self.register_pending_children(wrapper, &resolved, &handle)?;

                    if self.ms.result_ordered() {
                        previous = Some(handle);
                    } else {
                        self.store(handle, collector, &mut result_handler, &mut context);
                    }
                }
            }
        }

        if let Some(finished) = previous {
            self.store(finished, collector, &mut result_handler, &mut context);
        }
        Ok(())
    }

    /// Simple-path row projection: construct, auto-map, apply declared
    /// property mappings (nested queries included), wrap lazily if needed.
    fn row_value_simple(
        &mut self,
        executor: &mut dyn Executor,
        wrapper: &mut ResultSetWrapper,
        map: &Arc<ResultMap>,
        prefix: Option<&str>,
    ) -> Result<RowHandle> {
        let mut lazy_loaders = IndexMap::new();
        let handle = self.create_result_object(executor, wrapper, map, prefix, &mut lazy_loaders)?;

        if !self.is_scalar_result(map) {
            if self.should_auto_map(map, false) {
                self.apply_automatic_mappings(wrapper, map, prefix, &handle)?;
            }
            self.apply_property_mappings(executor, wrapper, map, prefix, &handle, &mut lazy_loaders)?;
        }

        if !lazy_loaders.is_empty() {
            handle.replace(Value::Proxy(ProxyRef::new(handle.value(), lazy_loaders)));
        }
        Ok(handle)
    }

    /// Nested-path row projection: joined rows with the same row key
    /// contribute to one parent; nested result maps recurse with combined
    /// keys.
    #[allow(clippy::too_many_arguments)]
    fn row_value_nested(
        &mut self,
        executor: &mut dyn Executor,
        wrapper: &mut ResultSetWrapper,
        map: &Arc<ResultMap>,
        combined_key: Option<CacheKey>,
        prefix: Option<&str>,
        partial: Option<RowHandle>,
    ) -> Result<RowHandle> {
        if let Some(handle) = partial {
            self.ancestor_objects
                .insert(map.id().to_string(), handle.clone());
            self.apply_nested_result_mappings(
                executor,
                wrapper,
                map,
                &handle,
                combined_key,
                prefix,
                false,
            )?;
            self.ancestor_objects.shift_remove(map.id());
            return Ok(handle);
        }

        let mut lazy_loaders = IndexMap::new();
        let handle = self.create_result_object(executor, wrapper, map, prefix, &mut lazy_loaders)?;

        if !self.is_scalar_result(map) {
            if self.should_auto_map(map, true) {
                self.apply_automatic_mappings(wrapper, map, prefix, &handle)?;
            }
            self.apply_property_mappings(executor, wrapper, map, prefix, &handle, &mut lazy_loaders)?;

            self.ancestor_objects
                .insert(map.id().to_string(), handle.clone());
            self.apply_nested_result_mappings(
                executor,
                wrapper,
                map,
                &handle,
                combined_key,
                prefix,
                true,
            )?;
            self.ancestor_objects.shift_remove(map.id());
        }

        if !lazy_loaders.is_empty() {
            handle.replace(Value::Proxy(ProxyRef::new(handle.value(), lazy_loaders)));
        }
        Ok(handle)
    }

    /// Scalar result maps project the single column through a type handler
    /// instead of building an object.
    fn is_scalar_result(&self, map: &ResultMap) -> bool {
        self.config.type_handlers().has(map.value_kind())
    }

    fn should_auto_map(&self, map: &ResultMap, nested: bool) -> bool {
        if let Some(declared) = map.auto_mapping() {
            return declared;
        }
        match self.config.settings().auto_mapping_behavior {
            AutoMappingBehavior::None => false,
            AutoMappingBehavior::Partial => !nested,
            AutoMappingBehavior::Full => true,
        }
    }

    fn create_result_object(
        &mut self,
        executor: &mut dyn Executor,
        wrapper: &mut ResultSetWrapper,
        map: &Arc<ResultMap>,
        prefix: Option<&str>,
        lazy_loaders: &mut IndexMap<String, LazyLoad>,
    ) -> Result<RowHandle> {
        if !map.constructor_mappings().is_empty() {
            return self.create_by_constructor(executor, wrapper, map, prefix, lazy_loaders);
        }

        if self.is_scalar_result(map) {
            let handler = self
                .config
                .type_handlers()
                .resolve(map.value_kind(), None);
            let value = match map
                .property_mappings()
                .first()
                .and_then(ResultMapping::column)
            {
                Some(column) => wrapper.value_with(handler.as_ref(), &prefixed(column, prefix))?,
                None => wrapper.value_at(handler.as_ref(), 0)?,
            };
            return Ok(RowHandle::new(value));
        }

        Ok(RowHandle::new(self.config.object_factory().create()))
    }

    fn create_by_constructor(
        &mut self,
        executor: &mut dyn Executor,
        wrapper: &mut ResultSetWrapper,
        map: &Arc<ResultMap>,
        prefix: Option<&str>,
        _lazy_loaders: &mut IndexMap<String, LazyLoad>,
    ) -> Result<RowHandle> {
        let mut args = Vec::new();
        for (i, mapping) in map.constructor_mappings().iter().enumerate() {
            let name = mapping
                .property()
                .map(str::to_string)
                .unwrap_or_else(|| format!("arg{i}"));

            let value = if mapping.nested_query_id().is_some() {
                // Constructor arguments load eagerly; deferral cannot reach
                // a value that must exist before the object does.
                self.nested_query_value(executor, wrapper, mapping, prefix)?
            } else if let Some(nested_id) = mapping.nested_result_map_id() {
                let nested_map = self.config.result_map(nested_id)?;
                let nested_map = self.resolve_discriminator(wrapper, nested_map, prefix)?;
                let child_prefix = concat_prefix(prefix, mapping.column_prefix());
                self.row_value_simple(executor, wrapper, &nested_map, child_prefix.as_deref())?
                    .value()
            } else {
                self.column_value(wrapper, mapping, prefix)?
            };
            args.push((name, value));
        }

        let object = self.config.object_factory().create_with(args)?;
        Ok(RowHandle::new(object))
    }

    fn column_value(
        &self,
        wrapper: &ResultSetWrapper,
        mapping: &ResultMapping,
        prefix: Option<&str>,
    ) -> Result<Value> {
        let Some(column) = mapping.column() else {
            return Ok(Value::Null);
        };
        let handler = match mapping.type_handler() {
            Some(handler) => handler.clone(),
            None => self
                .config
                .type_handlers()
                .resolve(mapping.value_kind(), mapping.sql_type()),
        };
        wrapper.value_with(handler.as_ref(), &prefixed(column, prefix))
    }

    fn apply_automatic_mappings(
        &self,
        wrapper: &mut ResultSetWrapper,
        map: &Arc<ResultMap>,
        prefix: Option<&str>,
        handle: &RowHandle,
    ) -> Result<()> {
        let settings = self.config.settings();
        for label in wrapper.unmapped_labels(map, prefix) {
            let stripped = match prefix {
                Some(prefix) => {
                    let lowered = label.to_uppercase();
                    match lowered.strip_prefix(&prefix.to_uppercase()) {
                        Some(_) => label[prefix.len()..].to_string(),
                        // Columns outside the prefix belong to other maps.
                        None => continue,
                    }
                }
                None => label.clone(),
            };

            let property = if settings.map_underscore_to_camel_case {
                camel_case(&stripped)
            } else {
                stripped
            };

            let value = wrapper.raw(&label)?;
            if !value.is_null() || settings.call_setters_on_nulls {
                handle.set_property(&property, value)?;
            }
        }
        Ok(())
    }

    fn apply_property_mappings(
        &mut self,
        executor: &mut dyn Executor,
        wrapper: &mut ResultSetWrapper,
        map: &Arc<ResultMap>,
        prefix: Option<&str>,
        handle: &RowHandle,
        lazy_loaders: &mut IndexMap<String, LazyLoad>,
    ) -> Result<()> {
        for mapping in map.property_mappings() {
            // Linked and join-nested mappings are handled elsewhere.
            if mapping.result_set().is_some() || mapping.nested_result_map_id().is_some() {
                continue;
            }

            if mapping.nested_query_id().is_some() {
                self.apply_nested_query(executor, wrapper, mapping, prefix, handle, lazy_loaders)?;
                continue;
            }

            let Some(property) = mapping.property() else {
                continue;
            };
            let value = self.column_value(wrapper, mapping, prefix)?;
            if !value.is_null() || self.config.settings().call_setters_on_nulls {
                handle.set_property(property, value)?;
            }
        }
        Ok(())
    }

    /// Builds the nested-query parameter from the mapping's column (or
    /// composite columns). All-null parameters suppress the query.
    fn nested_query_parameter(
        &self,
        wrapper: &ResultSetWrapper,
        mapping: &ResultMapping,
        prefix: Option<&str>,
    ) -> Result<Value> {
        if mapping.composites().is_empty() {
            return self.column_value(wrapper, mapping, prefix);
        }

        let mut object = tessera_core::value::ValueObject::new();
        let mut any = false;
        for composite in mapping.composites() {
            let value = self.column_value(wrapper, composite, prefix)?;
            any |= !value.is_null();
            if let Some(property) = composite.property() {
                object.insert(property.to_string(), value);
            }
        }
        Ok(if any { Value::Object(object) } else { Value::Null })
    }

    /// Runs a nested query eagerly and shapes the result for the property.
    fn nested_query_value(
        &mut self,
        executor: &mut dyn Executor,
        wrapper: &mut ResultSetWrapper,
        mapping: &ResultMapping,
        prefix: Option<&str>,
    ) -> Result<Value> {
        let statement_id = mapping.nested_query_id().expect("nested query mapping");
        let nested_ms = self.config.mapped_statement(statement_id)?;
        let mut parameter = self.nested_query_parameter(wrapper, mapping, prefix)?;
        if parameter.is_null() {
            return Ok(Value::Null);
        }
        let rows = executor.query(&nested_ms, &mut parameter, RowBounds::DEFAULT, None)?;
        collect_nested(rows, mapping.value_kind())
    }

    fn apply_nested_query(
        &mut self,
        executor: &mut dyn Executor,
        wrapper: &mut ResultSetWrapper,
        mapping: &ResultMapping,
        prefix: Option<&str>,
        handle: &RowHandle,
        lazy_loaders: &mut IndexMap<String, LazyLoad>,
    ) -> Result<()> {
        let property = mapping
            .property()
            .ok_or_else(|| Error::parse("nested query mapping declares no property"))?;
        let statement_id = mapping.nested_query_id().expect("nested query mapping");
        let nested_ms = self.config.mapped_statement(statement_id)?;

        let parameter = self.nested_query_parameter(wrapper, mapping, prefix)?;
        if parameter.is_null() {
            return Ok(());
        }

        if mapping.lazy() && self.config.settings().lazy_loading_enabled {
            lazy_loaders.insert(
                property.to_string(),
                LazyLoad {
                    statement_id: statement_id.to_string(),
                    parameter,
                    kind: mapping.value_kind(),
                },
            );
            return Ok(());
        }

        let bound = nested_ms.bound_sql(&self.config, &parameter)?;
        let key = executor.create_cache_key(&nested_ms, &parameter, &RowBounds::DEFAULT, &bound)?;

        if executor.is_cached(&key) {
            // The value is cached or mid-construction: load now or enqueue
            // behind the in-flight query.
            executor.defer_load(
                &nested_ms,
                handle.clone(),
                property.to_string(),
                key,
                mapping.value_kind(),
            )?;
        } else {
            let mut parameter = parameter;
            let rows = executor.query(&nested_ms, &mut parameter, RowBounds::DEFAULT, None)?;
            let value = collect_nested(rows, mapping.value_kind())?;
            if !value.is_null() || self.config.settings().call_setters_on_nulls {
                handle.set_property(property, value)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_nested_result_mappings(
        &mut self,
        executor: &mut dyn Executor,
        wrapper: &mut ResultSetWrapper,
        map: &Arc<ResultMap>,
        parent: &RowHandle,
        parent_key: Option<CacheKey>,
        parent_prefix: Option<&str>,
        new_object: bool,
    ) -> Result<()> {
        for mapping in map.property_mappings() {
            let Some(nested_id) = mapping.nested_result_map_id() else {
                continue;
            };
            if mapping.result_set().is_some() {
                continue;
            }

            let prefix = concat_prefix(parent_prefix, mapping.column_prefix());
            let nested_map = self.config.result_map(nested_id)?;
            let nested_map =
                self.resolve_discriminator(wrapper, nested_map, prefix.as_deref())?;

            // A nested map already under construction up-stack is a cycle:
            // link the ancestor instead of recursing into it.
            if let Some(ancestor) = self.ancestor_objects.get(nested_map.id()).cloned() {
                if new_object {
                    link_objects(parent, mapping, ancestor.value())?;
                }
                continue;
            }

            if !self.row_has_nested_values(wrapper, mapping, &nested_map, prefix.as_deref())? {
                continue;
            }

            let nested_key = self.create_row_key(wrapper, &nested_map, prefix.as_deref())?;
            let combined = match (&nested_key, &parent_key) {
                (Some(nested), Some(parent)) => Some(nested.combine(parent)),
                (Some(nested), None) => Some(nested.clone()),
                _ => None,
            };

            let known = combined
                .as_ref()
                .and_then(|key| self.nested_result_objects.get(key).cloned());
            let is_new = known.is_none();

            let nested_handle = match known {
                Some(existing) => {
                    self.row_value_nested(
                        executor,
                        wrapper,
                        &nested_map,
                        combined,
                        prefix.as_deref(),
                        Some(existing.clone()),
                    )?;
                    existing
                }
                None => {
                    let built = self.row_value_nested(
                        executor,
                        wrapper,
                        &nested_map,
                        combined.clone(),
                        prefix.as_deref(),
                        None,
                    )?;
                    if let Some(key) = combined {
                        self.nested_result_objects.insert(key, built.clone());
                    }
                    built
                }
            };

            if is_new {
                link_objects(parent, mapping, nested_handle.value())?;
            }
        }
        Ok(())
    }

    /// A nested object is present only when its guard columns (declared
    /// `notNullColumns`, else any of its mapped columns) carry values. This
    /// is what keeps left-joined rows from producing phantom empties.
    fn row_has_nested_values(
        &self,
        wrapper: &ResultSetWrapper,
        mapping: &ResultMapping,
        nested_map: &ResultMap,
        prefix: Option<&str>,
    ) -> Result<bool> {
        if !mapping.not_null_columns().is_empty() {
            for column in mapping.not_null_columns() {
                if !wrapper.raw(&prefixed(column, prefix))?.is_null() {
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        let mapped = wrapper.mapped_labels(nested_map, prefix);
        if mapped.is_empty() {
            return Ok(true);
        }
        for label in mapped {
            if !wrapper.raw(&label)?.is_null() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Row key over the id-role columns (or every mapped column when no id
    /// is declared; or the whole row for map-shaped results). `None` when
    /// the row carries no identifying values.
    fn create_row_key(
        &self,
        wrapper: &ResultSetWrapper,
        map: &ResultMap,
        prefix: Option<&str>,
    ) -> Result<Option<CacheKey>> {
        let mut key = CacheKey::new();
        key.update(Value::String(map.id().to_string()));
        let mut found = false;

        let id_mappings = map.id_mappings();
        let mappings: Vec<&ResultMapping> = if id_mappings.is_empty() {
            map.property_mappings()
                .iter()
                .filter(|mapping| {
                    mapping.nested_result_map_id().is_none() && mapping.column().is_some()
                })
                .collect()
        } else {
            id_mappings.iter().collect()
        };

        if mappings.is_empty() {
            // Map-shaped results key over the entire row.
            for column in wrapper.columns() {
                let value = wrapper.raw(&column.label)?;
                if !value.is_null() {
                    key.update(Value::String(column.label.clone()));
                    key.update(value);
                    found = true;
                }
            }
        } else {
            for mapping in mappings {
                let Some(column) = mapping.column() else {
                    continue;
                };
                let column = prefixed(column, prefix);
                let value = wrapper.raw(&column)?;
                if !value.is_null() {
                    key.update(Value::String(column));
                    key.update(value);
                    found = true;
                }
            }
        }

        Ok(found.then_some(key))
    }

    /// Registers this row as a pending parent for every mapping that waits
    /// for a named future result set.
    fn register_pending_children(
        &mut self,
        wrapper: &ResultSetWrapper,
        map: &ResultMap,
        handle: &RowHandle,
    ) -> Result<()> {
        for mapping in map.property_mappings() {
            let Some(name) = mapping.result_set() else {
                continue;
            };
            self.next_result_maps
                .insert(name.to_string(), mapping.clone());

            let key = multi_result_key(wrapper, mapping, mapping.column())?;
            self.pending_relations.entry(key).or_default().push(
                PendingRelation {
                    parent: handle.clone(),
                    mapping: mapping.clone(),
                },
            );
        }
        Ok(())
    }

    /// Projects a linked result set and attaches each row to the pending
    /// parents whose key columns match its foreign columns.
    fn handle_linked_result_set(
        &mut self,
        executor: &mut dyn Executor,
        wrapper: &mut ResultSetWrapper,
        map: &Arc<ResultMap>,
        parent_mapping: &ResultMapping,
    ) -> Result<()> {
        while wrapper.next()? {
            let resolved = self.resolve_discriminator(wrapper, map.clone(), None)?;
            let row = self.row_value_simple(executor, wrapper, &resolved, None)?;

            let key = multi_result_key(wrapper, parent_mapping, parent_mapping.foreign_column())?;
            if let Some(relations) = self.pending_relations.get(&key).cloned() {
                for relation in relations {
                    link_objects(&relation.parent, &relation.mapping, row.value())?;
                }
            }
        }
        Ok(())
    }

    /// Walks the discriminator chain for the current row. The visited set
    /// breaks cycles without error, and the chain length is bounded by the
    /// number of reachable result maps.
    fn resolve_discriminator(
        &self,
        wrapper: &mut ResultSetWrapper,
        map: Arc<ResultMap>,
        prefix: Option<&str>,
    ) -> Result<Arc<ResultMap>> {
        let mut current = map;
        let mut visited = HashSet::new();
        visited.insert(current.id().to_string());

        while let Some(discriminator) = current.discriminator() {
            let value = self.column_value(wrapper, discriminator.mapping(), prefix)?;
            if value.is_null() {
                break;
            }
            let Some(case_id) = discriminator.resolve(&value.to_string()) else {
                break;
            };
            if !self.config.has_result_map(case_id) || !visited.insert(case_id.to_string()) {
                break;
            }
            trace!(case = case_id, "discriminator selected");
            current = self.config.result_map(case_id)?;
        }
        Ok(current)
    }
}

/// Attaches a nested value to its parent: collections accumulate, single
/// associations assign.
fn link_objects(parent: &RowHandle, mapping: &ResultMapping, value: Value) -> Result<()> {
    let Some(property) = mapping.property() else {
        return Ok(());
    };

    let collection = mapping.value_kind() == ValueKind::List;
    if !collection {
        return parent.set_property(property, value);
    }

    let current = parent.get_property(property)?;
    let items = match current {
        Value::Null => vec![value],
        Value::List(mut items) => {
            items.push(value);
            items
        }
        other => {
            return Err(Error::reflection(format!(
                "collection property `{property}` already holds a non-list value: {other}"
            )))
        }
    };
    parent.set_property(property, Value::List(items))
}

/// Key over the declared column set, matching pending parents to linked
/// rows across result sets.
fn multi_result_key(
    wrapper: &ResultSetWrapper,
    mapping: &ResultMapping,
    columns: Option<&str>,
) -> Result<CacheKey> {
    let mut key = CacheKey::new();
    if let Some(property) = mapping.property() {
        key.update(Value::String(property.to_string()));
    }
    if let (Some(names), Some(columns)) = (mapping.column(), columns) {
        for (name, column) in names.split(',').zip(columns.split(',')) {
            key.update(Value::String(name.trim().to_string()));
            let value = wrapper.raw(column.trim())?;
            key.update(Value::String(value.to_string()));
        }
    }
    Ok(key)
}

fn collect_nested(rows: Vec<Value>, kind: ValueKind) -> Result<Value> {
    if kind == ValueKind::List {
        return Ok(Value::List(rows));
    }
    match rows.len() {
        0 => Ok(Value::Null),
        1 => Ok(rows.into_iter().next().expect("one row")),
        n => Err(Error::executor(format!(
            "nested query expected one row, found {n}"
        ))),
    }
}

fn prefixed(column: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}{column}"),
        None => column.to_string(),
    }
}

fn concat_prefix(parent: Option<&str>, own: Option<&str>) -> Option<String> {
    match (parent, own) {
        (None, None) => None,
        (Some(parent), None) => Some(parent.to_string()),
        (None, Some(own)) => Some(own.to_string()),
        (Some(parent), Some(own)) => Some(format!("{parent}{own}")),
    }
}
