use crate::expr::Scope;
use crate::meta::MetaValue;
use crate::path::PropertyPath;
use crate::value::ValueObject;
use crate::{Result, Value};

/// Name of the binding that always holds the whole parameter object.
pub const PARAMETER_BINDING: &str = "_parameter";

/// Name of the binding that holds the active database id.
pub const DATABASE_ID_BINDING: &str = "_databaseId";

/// The layered name-resolution map a dynamic template evaluates against:
/// explicit bindings first (`<bind>`, foreach variables, `_parameter`),
/// falling back to properties of the parameter object.
#[derive(Debug, Clone)]
pub struct Bindings {
    map: ValueObject,
    parameter: Value,
}

impl Bindings {
    pub fn new(parameter: Value, database_id: Option<&str>) -> Bindings {
        let mut map = ValueObject::new();
        map.insert(PARAMETER_BINDING.to_string(), parameter.clone());
        map.insert(
            DATABASE_ID_BINDING.to_string(),
            database_id.map(Value::from).unwrap_or(Value::Null),
        );
        Bindings { map, parameter }
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.map.insert(name.into(), value);
    }

    pub fn unbind(&mut self, name: &str) {
        self.map.shift_remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// The explicit binding entries, in insertion order.
    pub fn entries(&self) -> &ValueObject {
        &self.map
    }

    pub fn parameter(&self) -> &Value {
        &self.parameter
    }

    /// Resolves a dotted path: if the head segment names an explicit
    /// binding, the rest of the path navigates inside it; otherwise the
    /// whole path navigates the parameter object.
    pub fn lookup_path(&self, path: &PropertyPath) -> Result<Option<Value>> {
        let head = &path.head().name;
        if let Some(bound) = self.map.get(head) {
            if path.len() == 1 && path.head().index.is_none() {
                return Ok(Some(bound.clone()));
            }
            let mut scoped = ValueObject::new();
            scoped.insert(head.clone(), bound.clone());
            let scoped = Value::Object(scoped);
            return Ok(Some(MetaValue::new(&scoped).get_path(path)?));
        }

        match &self.parameter {
            Value::Object(_) | Value::Proxy(_) => {
                Ok(Some(MetaValue::new(&self.parameter).get_path(path)?))
            }
            _ => Ok(None),
        }
    }
}

impl Scope for Bindings {
    fn resolve(&self, name: &str) -> Result<Option<Value>> {
        if let Some(bound) = self.map.get(name) {
            return Ok(Some(bound.clone()));
        }
        match &self.parameter {
            Value::Object(_) | Value::Proxy(_) => {
                Ok(MetaValue::new(&self.parameter).get(name).ok())
            }
            _ => Ok(None),
        }
    }
}

/// Per-invocation evaluation state for a dynamic SQL template: the bindings,
/// the SQL assembly buffer (fragments joined with single spaces), and the
/// unique-suffix counter that scopes foreach variable renaming to one
/// evaluation.
pub struct RenderContext {
    bindings: Bindings,
    fragments: Vec<String>,
    unique: u32,
    foreach_nullable_default: bool,
}

impl RenderContext {
    pub fn new(parameter: Value, database_id: Option<&str>) -> RenderContext {
        RenderContext {
            bindings: Bindings::new(parameter, database_id),
            fragments: Vec::new(),
            unique: 0,
            foreach_nullable_default: false,
        }
    }

    /// Installs the configuration-level `nullable_on_for_each` default. A
    /// `<foreach nullable="...">` attribute overrides it per node.
    pub fn with_foreach_nullable_default(mut self, nullable: bool) -> RenderContext {
        self.foreach_nullable_default = nullable;
        self
    }

    pub fn foreach_nullable_default(&self) -> bool {
        self.foreach_nullable_default
    }

    pub fn append_sql(&mut self, part: &str) {
        self.fragments.push(part.to_string());
    }

    /// The assembled SQL so far.
    pub fn sql(&self) -> String {
        self.fragments.join(" ").trim().to_string()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.bind(name, value);
    }

    pub fn unbind(&mut self, name: &str) {
        self.bindings.unbind(name);
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn next_unique(&mut self) -> u32 {
        let n = self.unique;
        self.unique += 1;
        n
    }

    /// Runs `body` with an empty SQL buffer and hands back what it produced,
    /// restoring the surrounding buffer afterwards. Bindings and the unique
    /// counter flow through untouched.
    pub fn capture(
        &mut self,
        body: impl FnOnce(&mut RenderContext) -> Result<bool>,
    ) -> Result<(bool, String)> {
        let outer = std::mem::take(&mut self.fragments);
        let applied = body(self);
        let captured = std::mem::replace(&mut self.fragments, outer);
        let applied = applied?;
        Ok((applied, captured.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameter() -> Value {
        let mut map = ValueObject::new();
        map.insert("id".to_string(), Value::Long(7));
        Value::Object(map)
    }

    #[test]
    fn joins_fragments_with_spaces() {
        let mut ctx = RenderContext::new(parameter(), None);
        ctx.append_sql("SELECT *");
        ctx.append_sql("FROM users");
        assert_eq!(ctx.sql(), "SELECT * FROM users");
    }

    #[test]
    fn bindings_shadow_parameter_properties() {
        let mut ctx = RenderContext::new(parameter(), None);
        assert_eq!(ctx.bindings().resolve("id").unwrap(), Some(Value::Long(7)));

        ctx.bind("id", Value::Long(9));
        assert_eq!(ctx.bindings().resolve("id").unwrap(), Some(Value::Long(9)));
    }

    #[test]
    fn parameter_binding_is_preinstalled() {
        let ctx = RenderContext::new(parameter(), Some("h2"));
        assert_eq!(
            ctx.bindings().resolve(PARAMETER_BINDING).unwrap(),
            Some(parameter())
        );
        assert_eq!(
            ctx.bindings().resolve(DATABASE_ID_BINDING).unwrap(),
            Some(Value::String("h2".into()))
        );
    }

    #[test]
    fn capture_restores_outer_buffer() {
        let mut ctx = RenderContext::new(parameter(), None);
        ctx.append_sql("outer");
        let (applied, inner) = ctx
            .capture(|ctx| {
                ctx.append_sql("inner");
                Ok(true)
            })
            .unwrap();
        assert!(applied);
        assert_eq!(inner, "inner");
        assert_eq!(ctx.sql(), "outer");
    }

    #[test]
    fn lookup_path_prefers_bindings() {
        let mut ctx = RenderContext::new(parameter(), None);
        ctx.bind("item", Value::Long(42));
        let path = PropertyPath::parse("item").unwrap();
        assert_eq!(
            ctx.bindings().lookup_path(&path).unwrap(),
            Some(Value::Long(42))
        );

        let path = PropertyPath::parse("id").unwrap();
        assert_eq!(
            ctx.bindings().lookup_path(&path).unwrap(),
            Some(Value::Long(7))
        );
    }
}
