//! A scripted in-memory driver for exercising the engine without a real
//! database: register the result sets, update counts, generated keys and
//! OUT values each SQL text should produce, then inspect what was executed.

use tessera_core::driver::{
    Column, Connection, DataSource, ResultSet, ResultSetType, Statement, StatementOptions,
    Transaction, TransactionFactory,
};
use tessera_core::mapping::Environment;
use tessera_core::ty::SqlType;
use tessera_core::{Result, Value};

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One scripted tabular result.
#[derive(Debug, Clone)]
pub struct StubResultSet {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl StubResultSet {
    pub fn new(columns: &[&str], rows: Vec<Vec<Value>>) -> StubResultSet {
        StubResultSet {
            columns: columns
                .iter()
                .map(|label| Column::new(*label, SqlType::Other))
                .collect(),
            rows,
        }
    }
}

/// One statement execution the driver observed.
#[derive(Debug, Clone)]
pub struct Executed {
    pub sql: String,
    pub parameters: Vec<Value>,
}

#[derive(Default)]
struct StubState {
    queries: Mutex<HashMap<String, Vec<StubResultSet>>>,
    update_counts: Mutex<HashMap<String, u64>>,
    generated_keys: Mutex<HashMap<String, StubResultSet>>,
    out_values: Mutex<HashMap<String, HashMap<usize, Value>>>,
    log: Mutex<Vec<Executed>>,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// The scripted driver. Clones share the script and the execution log; it
/// acts as both the data source and the transaction factory.
#[derive(Clone, Default)]
pub struct StubDriver {
    state: Arc<StubState>,
}

impl StubDriver {
    pub fn new() -> StubDriver {
        StubDriver::default()
    }

    /// Scripts a single result set for a SQL text.
    pub fn on_query(&self, sql: &str, columns: &[&str], rows: Vec<Vec<Value>>) {
        self.on_query_sets(sql, vec![StubResultSet::new(columns, rows)]);
    }

    /// Scripts multiple result sets (stored procedures, `resultSets`
    /// linking).
    pub fn on_query_sets(&self, sql: &str, sets: Vec<StubResultSet>) {
        self.state.queries.lock().insert(sql.to_string(), sets);
    }

    pub fn on_update(&self, sql: &str, count: u64) {
        self.state
            .update_counts
            .lock()
            .insert(sql.to_string(), count);
    }

    /// Scripts an update that also returns driver-generated keys.
    pub fn on_update_with_keys(
        &self,
        sql: &str,
        count: u64,
        key_columns: &[&str],
        key_rows: Vec<Vec<Value>>,
    ) {
        self.on_update(sql, count);
        self.state
            .generated_keys
            .lock()
            .insert(sql.to_string(), StubResultSet::new(key_columns, key_rows));
    }

    /// Scripts an OUT parameter value for a callable statement.
    pub fn on_out_value(&self, sql: &str, index: usize, value: Value) {
        self.state
            .out_values
            .lock()
            .entry(sql.to_string())
            .or_default()
            .insert(index, value);
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.state.log.lock().clone()
    }

    pub fn commits(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.state.rollbacks.load(Ordering::SeqCst)
    }

    /// A ready-made environment wrapping this driver.
    pub fn environment(&self, id: &str) -> Environment {
        Environment::new(id, Arc::new(self.clone()), Arc::new(self.clone()))
    }
}

impl DataSource for StubDriver {
    fn connection(&self) -> Result<Box<dyn Connection>> {
        Ok(Box::new(StubConnection {
            state: self.state.clone(),
        }))
    }
}

impl TransactionFactory for StubDriver {
    fn new_transaction(
        &self,
        data_source: &dyn DataSource,
        _auto_commit: bool,
    ) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(StubTransaction {
            state: self.state.clone(),
            connection: data_source.connection()?,
        }))
    }
}

struct StubTransaction {
    state: Arc<StubState>,
    connection: Box<dyn Connection>,
}

impl Transaction for StubTransaction {
    fn connection(&mut self) -> Result<&mut dyn Connection> {
        Ok(self.connection.as_mut())
    }

    fn commit(&mut self) -> Result<()> {
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct StubConnection {
    state: Arc<StubState>,
}

impl Connection for StubConnection {
    fn prepare(&mut self, sql: &str, _options: &StatementOptions) -> Result<Box<dyn Statement>> {
        Ok(Box::new(StubStatement {
            state: self.state.clone(),
            sql: sql.to_string(),
            bound: BTreeMap::new(),
            batched: Vec::new(),
            pending_sets: VecDeque::new(),
            update_count: None,
            keys: None,
            outs: HashMap::new(),
        }))
    }
}

struct StubStatement {
    state: Arc<StubState>,
    sql: String,
    bound: BTreeMap<usize, Value>,
    batched: Vec<Vec<Value>>,
    pending_sets: VecDeque<StubResultSet>,
    update_count: Option<u64>,
    keys: Option<StubResultSet>,
    outs: HashMap<usize, Value>,
}

impl StubStatement {
    fn log_execution(&self, parameters: Vec<Value>) {
        self.state.log.lock().push(Executed {
            sql: self.sql.clone(),
            parameters,
        });
    }
}

impl Statement for StubStatement {
    fn bind(&mut self, index: usize, value: Value, _sql_type: Option<SqlType>) -> Result<()> {
        self.bound.insert(index, value);
        Ok(())
    }

    fn register_out(&mut self, index: usize, _sql_type: SqlType) -> Result<()> {
        self.outs.insert(index, Value::Null);
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        self.log_execution(self.bound.values().cloned().collect());

        if let Some(sets) = self.state.queries.lock().get(&self.sql) {
            self.pending_sets = sets.iter().cloned().collect();
        }
        self.update_count = self.state.update_counts.lock().get(&self.sql).copied();
        self.keys = self.state.generated_keys.lock().get(&self.sql).cloned();
        if let Some(outs) = self.state.out_values.lock().get(&self.sql) {
            for (index, value) in outs {
                self.outs.insert(*index, value.clone());
            }
        }
        Ok(())
    }

    fn add_batch(&mut self) -> Result<()> {
        self.batched
            .push(self.bound.values().cloned().collect());
        self.bound.clear();
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>> {
        let count = self
            .state
            .update_counts
            .lock()
            .get(&self.sql)
            .copied()
            .unwrap_or(1);
        let mut counts = Vec::with_capacity(self.batched.len());
        for parameters in self.batched.drain(..).collect::<Vec<_>>() {
            self.log_execution(parameters);
            counts.push(count);
        }
        self.keys = self.state.generated_keys.lock().get(&self.sql).cloned();
        Ok(counts)
    }

    fn update_count(&self) -> Option<u64> {
        self.update_count
    }

    fn result_set(&mut self) -> Result<Option<Box<dyn ResultSet>>> {
        Ok(self
            .pending_sets
            .pop_front()
            .map(|set| Box::new(StubRows::new(set)) as Box<dyn ResultSet>))
    }

    fn generated_keys(&mut self) -> Result<Option<Box<dyn ResultSet>>> {
        Ok(self
            .keys
            .take()
            .map(|set| Box::new(StubRows::new(set)) as Box<dyn ResultSet>))
    }

    fn out_value(&mut self, index: usize) -> Result<Value> {
        Ok(self.outs.get(&index).cloned().unwrap_or(Value::Null))
    }
}

struct StubRows {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
}

impl StubRows {
    fn new(set: StubResultSet) -> StubRows {
        StubRows {
            columns: set.columns,
            rows: set.rows,
            position: None,
        }
    }
}

impl ResultSet for StubRows {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn next(&mut self) -> Result<bool> {
        let next = self.position.map(|position| position + 1).unwrap_or(0);
        if next < self.rows.len() {
            self.position = Some(next);
            Ok(true)
        } else {
            self.position = Some(self.rows.len());
            Ok(false)
        }
    }

    fn get(&self, index: usize) -> Result<Value> {
        let row = self
            .position
            .and_then(|position| self.rows.get(position))
            .ok_or_else(|| tessera_core::Error::executor("result set is not positioned on a row"))?;
        Ok(row.get(index).cloned().unwrap_or(Value::Null))
    }

    fn seek(&mut self, row: usize) -> Result<()> {
        // Positions so the following `next` lands on `row`.
        self.position = row.checked_sub(1).map(Some).unwrap_or(None);
        Ok(())
    }

    fn result_set_type(&self) -> ResultSetType {
        ResultSetType::ScrollInsensitive
    }
}
