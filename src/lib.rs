/*!
Compiles draft-04 JSON Schemas into a reusable validator that reports
every failing keyword, and optionally fills in `default` values.

# Example

```rust
# use std::error::Error;
use serde_json::json;
use verdict::{Algorithm, Compiler};

# fn main() -> Result<(), Box<dyn Error>> {
let mut compiler = Compiler::new();
compiler.enable_defaults();
compiler.add_schema(json!({
    "id": "person",
    "type": "object",
    "properties": {
        "name": {"type": "string"},
        "age": {"type": "integer", "minimum": 0},
        "tags": {"type": "array", "default": []}
    },
    "required": ["name"]
}));
let validator = compiler.compile()?;

let mut person = json!({"name": "ann", "age": 7});
let report = validator.validate(&mut person, "person")?;
assert!(report.valid);
assert_eq!(person["tags"], json!([]));

let mut person = json!({"age": -1});
let report = validator.validate_with(&mut person, "person", Algorithm::BestMatch)?;
assert!(!report.valid);
for e in &report.errors {
    println!("{e}");
}
# Ok(())
# }
```

Schemas are compiled once; the resulting [`Validator`] is immutable and can
be shared across threads. Validation mutates only the instance passed in,
and only when defaults are enabled. Defaults applied inside a failing
`anyOf`/`oneOf`/`allOf` branch, or by a failing validation, are removed
again.
*/

mod compiler;
mod extensions;
mod formats;
mod output;
mod planner;
mod registry;
mod undo;
mod util;
mod validator;

pub use {
    compiler::{compile, CompileError, Compiler, ErrorOptions, Options},
    extensions::{FormatFn, Keyword, Phase, TransformFn, Violation},
    output::{Algorithm, ErrorCode, Report, ValidationError},
    planner::{Applies, KeywordMeta},
};

use std::{
    fmt::{self, Display},
    sync::Arc,
};

use ahash::{AHashMap, AHashSet};
use extensions::Format;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use util::is_integer;

pub(crate) type UnitId = usize;

/// Compiled schemas, addressable by schema id.
///
/// Built by [`Compiler::compile`]. Holds no per-call state, so one
/// validator can serve any number of threads.
pub struct Validator {
    units: Vec<Unit>,
    roots: AHashMap<String, UnitId>,
    paths: AHashMap<String, UnitId>,
    options: Options,
    needs_root: bool,
}

impl Validator {
    /// Validates `instance` against the schema with `schema_id`.
    ///
    /// `schema_id` is a schema's id, or the path of a compiled subschema
    /// such as `"shape#/definitions/point"`. With defaults enabled,
    /// `instance` comes back with the defaults of a successful validation
    /// filled in.
    pub fn validate(&self, instance: &mut Value, schema_id: &str) -> Result<Report, ValidateError> {
        self.validate_with(instance, schema_id, Algorithm::None)
    }

    /// Like [`Validator::validate`], post-processing the report with
    /// `algorithm`.
    pub fn validate_with(
        &self,
        instance: &mut Value,
        schema_id: &str,
        algorithm: Algorithm,
    ) -> Result<Report, ValidateError> {
        let id = self.lookup(schema_id)?;
        let report = validator::validate(self, id, instance);
        Ok(report.apply(algorithm))
    }

    fn lookup(&self, schema_id: &str) -> Result<UnitId, ValidateError> {
        if schema_id.is_empty() {
            return Err(ValidateError::MissingSchemaId);
        }
        let id = schema_id.strip_suffix('#').unwrap_or(schema_id);
        self.roots
            .get(id)
            .or_else(|| self.paths.get(schema_id))
            .copied()
            .ok_or_else(|| ValidateError::UnknownSchema(schema_id.to_owned()))
    }

    /// ids of all top-level schemas.
    pub fn schema_ids(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.schema_ids().collect();
        ids.sort_unstable();
        f.debug_struct("Validator")
            .field("schemas", &ids)
            .field("units", &self.units.len())
            .field("options", &self.options)
            .finish()
    }
}

/// Misuse of [`Validator::validate`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidateError {
    #[error("no schema id given")]
    MissingSchemaId,
    #[error("no schema with id {0:?}")]
    UnknownSchema(String),
}

// Unit --

/// Executable plan for one schema path.
pub(crate) struct Unit {
    pub(crate) path: String,
    pub(crate) schema: Arc<Value>,
    pub(crate) default: Option<Value>,
    /// set for `$ref` nodes, which only delegate.
    pub(crate) target: Option<UnitId>,
    pub(crate) transforms: Vec<Transform>,
    pub(crate) blocks: Vec<Block>,
}

impl Unit {
    fn has_custom_keyword(&self) -> bool {
        self.blocks
            .iter()
            .flat_map(|b| &b.steps)
            .any(|s| matches!(s, Step::Custom { .. }))
    }
}

pub(crate) struct Transform {
    pub(crate) phase: Phase,
    pub(crate) value: Value,
    pub(crate) func: TransformFn,
}

/// steps guarded by one instance type.
pub(crate) struct Block {
    pub(crate) guard: Applies,
    pub(crate) steps: Vec<Step>,
}

pub(crate) enum Step {
    Type(Vec<Type>),
    Enum(Vec<Value>),
    MultipleOf(f64),
    Minimum { limit: f64, exclusive: bool },
    Maximum { limit: f64, exclusive: bool },
    MinLength(usize),
    MaxLength(usize),
    Pattern(Regex),
    Format(Format),
    /// `additionalItems: false` next to `max` tuple items.
    AdditionalItems { max: usize },
    MinItems(usize),
    MaxItems(usize),
    UniqueItems,
    Items(Items),
    Object(Box<ObjectPlan>),
    AllOf(Vec<UnitId>),
    AnyOf(Vec<UnitId>),
    OneOf(Vec<UnitId>),
    Not(UnitId),
    Custom {
        keyword: String,
        value: Value,
        imp: Arc<dyn Keyword>,
    },
}

pub(crate) enum Items {
    All(UnitId),
    Tuple {
        items: Vec<UnitId>,
        additional: Option<UnitId>,
    },
}

pub(crate) enum Additional {
    Forbid,
    Schema(UnitId),
}

pub(crate) enum Dependency {
    Keys(Vec<String>),
    Schema(UnitId),
}

/// Object keywords of one node, evaluated in a single pass over the
/// instance's keys.
#[derive(Default)]
pub(crate) struct ObjectPlan {
    /// in schema order, which is also the order defaults are applied in.
    pub(crate) properties: Vec<(String, UnitId)>,
    pub(crate) index: AHashMap<String, usize>,
    pub(crate) pattern_properties: Vec<(Regex, UnitId)>,
    pub(crate) additional: Option<Additional>,
    pub(crate) required: Vec<String>,
    pub(crate) min_properties: Option<usize>,
    pub(crate) max_properties: Option<usize>,
    pub(crate) dependencies: AHashMap<String, Dependency>,
}

impl ObjectPlan {
    pub(crate) fn property(&self, name: &str) -> Option<UnitId> {
        self.index.get(name).map(|&i| self.properties[i].1)
    }
}

// Type --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Type {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl Type {
    /// numbers without fraction are integers.
    pub(crate) fn of(v: &Value) -> Self {
        match v {
            Value::Null => Type::Null,
            Value::Bool(_) => Type::Boolean,
            Value::Number(n) if is_integer(n) => Type::Integer,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::Array(_) => Type::Array,
            Value::Object(_) => Type::Object,
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "null" => Some(Self::Null),
            "boolean" => Some(Self::Boolean),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "string" => Some(Self::String),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// reports whether a value of this type satisfies `want`.
    pub(crate) fn matches(self, want: Type) -> bool {
        self == want || (self == Type::Integer && want == Type::Number)
    }

    pub(crate) fn is(self, guard: Applies) -> bool {
        match guard {
            Applies::Any => true,
            Applies::Number => matches!(self, Type::Integer | Type::Number),
            Applies::String => self == Type::String,
            Applies::Array => self == Type::Array,
            Applies::Object => self == Type::Object,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// distinct types, in the order listed.
pub(crate) fn dedup_types(types: Vec<Type>) -> Vec<Type> {
    let mut seen = AHashSet::new();
    types.into_iter().filter(|t| seen.insert(*t)).collect()
}
