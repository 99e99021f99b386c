use crate::path::{PathIndex, PathSegment, PropertyPath};
use crate::ty::ValueKind;
use crate::value::ValueObject;
use crate::{Error, Result, Value};

/// Read-side navigation over a value tree.
///
/// Null or missing intermediate nodes resolve to null; structurally invalid
/// steps (a positional index into a scalar, a pending lazy property) raise a
/// reflection error.
pub struct MetaValue<'a> {
    root: &'a Value,
}

impl<'a> MetaValue<'a> {
    pub fn new(root: &'a Value) -> MetaValue<'a> {
        MetaValue { root }
    }

    pub fn get(&self, path: &str) -> Result<Value> {
        self.get_path(&PropertyPath::parse(path)?)
    }

    pub fn get_path(&self, path: &PropertyPath) -> Result<Value> {
        let mut current = self.root.clone();
        for segment in path.segments() {
            current = step(&current, segment)?;
            if current.is_null() {
                return Ok(Value::Null);
            }
        }
        Ok(current)
    }

    /// Whether the path resolves to a present (possibly null) property.
    pub fn has_property(&self, path: &str) -> bool {
        let Ok(path) = PropertyPath::parse(path) else {
            return false;
        };

        let mut current = self.root.clone();
        for (i, segment) in path.segments().iter().enumerate() {
            if !has_step(&current, segment) {
                return false;
            }
            if i + 1 < path.len() {
                match step(&current, segment) {
                    Ok(next) => current = next,
                    Err(_) => return false,
                }
            }
        }
        true
    }

    pub fn kind_of(&self, path: &str) -> Result<ValueKind> {
        Ok(ValueKind::of(&self.get(path)?))
    }
}

fn has_step(value: &Value, segment: &PathSegment) -> bool {
    match value {
        Value::Object(map) => map.contains_key(&segment.name),
        Value::Proxy(proxy) => {
            proxy.is_pending(&segment.name) || proxy.property(&segment.name).is_some()
        }
        _ => false,
    }
}

fn step(value: &Value, segment: &PathSegment) -> Result<Value> {
    let named = match value {
        Value::Null => Value::Null,
        Value::Object(map) => map.get(&segment.name).cloned().unwrap_or(Value::Null),
        Value::Proxy(proxy) => {
            if proxy.is_pending(&segment.name) {
                return Err(Error::reflection(format!(
                    "lazy property `{}` has not been loaded",
                    segment.name
                )));
            }
            proxy.property(&segment.name).unwrap_or(Value::Null)
        }
        other => {
            return Err(Error::reflection(format!(
                "cannot read property `{}` from a {:?} value",
                segment.name,
                ValueKind::of(other)
            )))
        }
    };

    let Some(index) = &segment.index else {
        return Ok(named);
    };

    match (&named, index) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::List(items), PathIndex::Position(position)) => {
            Ok(items.get(*position).cloned().unwrap_or(Value::Null))
        }
        (Value::Object(map), PathIndex::Key(key)) => {
            Ok(map.get(key).cloned().unwrap_or(Value::Null))
        }
        (other, _) => Err(Error::reflection(format!(
            "cannot index `{}` on a {:?} value",
            segment.name,
            ValueKind::of(other)
        ))),
    }
}

/// Write-side navigation. Missing intermediate objects are created on the
/// way down, so `set("a.b.c", v)` works against an empty object.
pub struct MetaValueMut<'a> {
    root: &'a mut Value,
}

impl<'a> MetaValueMut<'a> {
    pub fn new(root: &'a mut Value) -> MetaValueMut<'a> {
        MetaValueMut { root }
    }

    pub fn set(&mut self, path: &str, value: Value) -> Result<()> {
        let path = PropertyPath::parse(path)?;
        set_path(self.root, path.segments(), value)
    }
}

fn set_path(target: &mut Value, segments: &[PathSegment], value: Value) -> Result<()> {
    let (segment, rest) = segments
        .split_first()
        .expect("property path has at least one segment");

    if let Value::Proxy(proxy) = target {
        // Write through the shared cell so aliased clones observe the set.
        let mut snapshot = proxy.snapshot();
        set_path(&mut snapshot, segments, value)?;
        if let Value::Object(map) = snapshot {
            for (key, entry) in map {
                proxy.set_property(&key, entry);
            }
        }
        return Ok(());
    }

    if target.is_null() {
        *target = Value::object();
    }

    let Value::Object(map) = target else {
        return Err(Error::reflection(format!(
            "cannot write property `{}` into a {:?} value",
            segment.name,
            ValueKind::of(target)
        )));
    };

    let slot = map
        .entry(segment.name.clone())
        .or_insert_with(|| match segment.index {
            Some(PathIndex::Position(_)) => Value::List(vec![]),
            _ => Value::Null,
        });

    let slot = match &segment.index {
        None => slot,
        Some(PathIndex::Position(position)) => {
            let Value::List(items) = slot else {
                return Err(Error::reflection(format!(
                    "cannot index `{}` on a non-list value",
                    segment.name
                )));
            };
            if items.len() <= *position {
                items.resize(position + 1, Value::Null);
            }
            &mut items[*position]
        }
        Some(PathIndex::Key(key)) => {
            if slot.is_null() {
                *slot = Value::object();
            }
            let Value::Object(inner) = slot else {
                return Err(Error::reflection(format!(
                    "cannot key into `{}` on a non-object value",
                    segment.name
                )));
            };
            inner.entry(key.clone()).or_insert(Value::Null)
        }
    };

    if rest.is_empty() {
        *slot = value;
        Ok(())
    } else {
        set_path(slot, rest, value)
    }
}

/// Creates result objects. The default implementation builds plain object
/// values; callers with bespoke construction rules install their own.
pub trait ObjectFactory: Send + Sync {
    /// Default-construct an empty object.
    fn create(&self) -> Value {
        Value::object()
    }

    /// Construct from ordered, named constructor arguments.
    fn create_with(&self, args: Vec<(String, Value)>) -> Result<Value> {
        let mut map = ValueObject::new();
        for (name, value) in args {
            map.insert(name, value);
        }
        Ok(Value::Object(map))
    }

    fn create_list(&self) -> Value {
        Value::List(vec![])
    }
}

#[derive(Debug, Default)]
pub struct DefaultObjectFactory;

impl ObjectFactory for DefaultObjectFactory {}

/// Converts a column label to the camel-cased property spelling:
/// `USER_NAME` becomes `userName`.
pub fn camel_case(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut upper_next = false;
    for ch in label.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}
