use tessera_core::driver::{Column, ResultSet, ResultSetType};
use tessera_core::mapping::ResultMap;
use tessera_core::type_handler::TypeHandler;
use tessera_core::{Result, Value};

/// Wraps one driver result set with the column bookkeeping the projector
/// needs: label lookup, and the mapped/unmapped split for a result map and
/// column prefix.
pub struct ResultSetWrapper {
    rs: Box<dyn ResultSet>,
    columns: Vec<Column>,
}

impl ResultSetWrapper {
    pub fn new(rs: Box<dyn ResultSet>) -> ResultSetWrapper {
        let columns = rs.columns().to_vec();
        ResultSetWrapper { rs, columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn result_set_type(&self) -> ResultSetType {
        self.rs.result_set_type()
    }

    pub fn next(&mut self) -> Result<bool> {
        self.rs.next()
    }

    pub fn seek(&mut self, row: usize) -> Result<()> {
        self.rs.seek(row)
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.label.eq_ignore_ascii_case(label))
    }

    pub fn has_column(&self, label: &str) -> bool {
        self.column_index(label).is_some()
    }

    /// Raw driver value of a labeled column in the current row; null when
    /// the column is absent.
    pub fn raw(&self, label: &str) -> Result<Value> {
        match self.column_index(label) {
            Some(index) => self.rs.get(index),
            None => Ok(Value::Null),
        }
    }

    /// Reads a labeled column through a type handler; null when absent.
    pub fn value_with(&self, handler: &dyn TypeHandler, label: &str) -> Result<Value> {
        match self.column_index(label) {
            Some(index) => handler.result(self.rs.as_ref(), index),
            None => Ok(Value::Null),
        }
    }

    pub fn value_at(&self, handler: &dyn TypeHandler, index: usize) -> Result<Value> {
        handler.result(self.rs.as_ref(), index)
    }

    /// Column labels the result map claims (after prefix stripping), in
    /// result-set order.
    pub fn mapped_labels(&self, map: &ResultMap, prefix: Option<&str>) -> Vec<String> {
        self.split_labels(map, prefix).0
    }

    /// Column labels no mapping claims, candidates for auto-mapping.
    pub fn unmapped_labels(&self, map: &ResultMap, prefix: Option<&str>) -> Vec<String> {
        self.split_labels(map, prefix).1
    }

    fn split_labels(&self, map: &ResultMap, prefix: Option<&str>) -> (Vec<String>, Vec<String>) {
        let mut mapped = Vec::new();
        let mut unmapped = Vec::new();
        for column in &self.columns {
            let upper = column.label.to_uppercase();
            let candidate = match prefix {
                Some(prefix) => upper.strip_prefix(&prefix.to_uppercase()).map(str::to_string),
                None => Some(upper),
            };
            match candidate {
                Some(stripped) if map.mapped_columns().contains(&stripped) => {
                    mapped.push(column.label.clone())
                }
                _ => unmapped.push(column.label.clone()),
            }
        }
        (mapped, unmapped)
    }
}
