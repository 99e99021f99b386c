use crate::resultset::ResultSetWrapper;

use tessera_core::config::AutoMappingBehavior;
use tessera_core::driver::{ResultSetType, Statement};
use tessera_core::exec::{RowBounds, RowCursor};
use tessera_core::mapping::{MappedStatement, ResultMap, ResultMapping};
use tessera_core::meta::camel_case;
use tessera_core::{Configuration, Error, Result, Value};

use std::sync::Arc;

/// A lazily-consumed select: each step pulls one driver row and projects it
/// through the statement's first result map. The statement and result set
/// stay open until the cursor is closed (or exhausted).
///
/// Cursors stream row by row, so result maps that need cross-row state
/// (nested result maps) or a live executor (nested queries) are rejected at
/// construction.
pub struct DefaultCursor {
    config: Arc<Configuration>,
    result_map: Arc<ResultMap>,
    stmt: Option<Box<dyn Statement>>,
    wrapper: Option<ResultSetWrapper>,
    fetched: usize,
    limit: usize,
    closed: bool,
}

impl DefaultCursor {
    pub fn new(
        config: Arc<Configuration>,
        ms: Arc<MappedStatement>,
        mut stmt: Box<dyn Statement>,
        row_bounds: RowBounds,
    ) -> Result<DefaultCursor> {
        let result_map = ms
            .result_maps()
            .first()
            .cloned()
            .ok_or_else(|| Error::executor(format!("statement `{}` has no result map", ms.id())))?;

        if result_map.has_nested_result_maps() {
            return Err(Error::executor(
                "cursors do not support nested result maps",
            ));
        }
        if result_map.has_nested_queries() {
            return Err(Error::executor("cursors do not support nested queries"));
        }

        let rs = stmt.result_set()?.ok_or_else(|| {
            Error::executor(format!("statement `{}` produced no result set", ms.id()))
        })?;
        let mut wrapper = ResultSetWrapper::new(rs);

        if row_bounds.offset > 0 {
            if wrapper.result_set_type() != ResultSetType::ForwardOnly {
                wrapper.seek(row_bounds.offset)?;
            } else {
                for _ in 0..row_bounds.offset {
                    if !wrapper.next()? {
                        break;
                    }
                }
            }
        }

        Ok(DefaultCursor {
            config,
            result_map,
            stmt: Some(stmt),
            wrapper: Some(wrapper),
            fetched: 0,
            limit: row_bounds.limit,
            closed: false,
        })
    }

    fn map_row(&self, wrapper: &ResultSetWrapper) -> Result<Value> {
        let registry = self.config.type_handlers();

        if registry.has(self.result_map.value_kind()) {
            let handler = registry.resolve(self.result_map.value_kind(), None);
            return match self
                .result_map
                .property_mappings()
                .first()
                .and_then(ResultMapping::column)
            {
                Some(column) => wrapper.value_with(handler.as_ref(), column),
                None => wrapper.value_at(handler.as_ref(), 0),
            };
        }

        let mut object = self.config.object_factory().create();
        let settings = self.config.settings();

        if settings.auto_mapping_behavior != AutoMappingBehavior::None {
            for label in wrapper.unmapped_labels(&self.result_map, None) {
                let property = if settings.map_underscore_to_camel_case {
                    camel_case(&label)
                } else {
                    label.clone()
                };
                let value = wrapper.raw(&label)?;
                if !value.is_null() || settings.call_setters_on_nulls {
                    tessera_core::meta::MetaValueMut::new(&mut object)
                        .set(&property, value)?;
                }
            }
        }

        for mapping in self.result_map.property_mappings() {
            let (Some(property), Some(column)) = (mapping.property(), mapping.column()) else {
                continue;
            };
            let handler = match mapping.type_handler() {
                Some(handler) => handler.clone(),
                None => registry.resolve(mapping.value_kind(), mapping.sql_type()),
            };
            let value = wrapper.value_with(handler.as_ref(), column)?;
            if !value.is_null() || settings.call_setters_on_nulls {
                tessera_core::meta::MetaValueMut::new(&mut object).set(property, value)?;
            }
        }

        Ok(object)
    }
}

impl RowCursor for DefaultCursor {
    fn next_row(&mut self) -> Option<Result<Value>> {
        if self.closed || self.fetched >= self.limit {
            return None;
        }
        let wrapper = self.wrapper.as_mut()?;

        match wrapper.next() {
            Ok(true) => {}
            Ok(false) => {
                let _ = self.close();
                return None;
            }
            Err(err) => return Some(Err(err)),
        }

        self.fetched += 1;
        let row = {
            let wrapper = self.wrapper.as_ref()?;
            self.map_row(wrapper)
        };
        Some(row)
    }

    fn close(&mut self) -> Result<()> {
        // Dropping releases the driver-side statement and result set.
        self.wrapper = None;
        self.stmt = None;
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for DefaultCursor {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
