use std::{collections::VecDeque, sync::Arc};

use ahash::AHashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    extensions::{Extensions, Keyword, Phase},
    planner::{Applies, KeywordMeta, Plan, Planned},
    registry::{NodeId, Registry},
    util::*,
    *,
};

const DRAFT4_ID: &str = "http://json-schema.org/draft-04/schema";
const DRAFT4: &str = include_str!("metaschema/draft-04.json");

/// Compiler settings. Deserializable, so they can live in application
/// config; missing fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// fill absent properties and tuple items from `default`.
    pub enable_defaults: bool,
    /// check every schema against the draft-04 meta-schema first.
    pub validate_schemas: bool,
    pub errors: ErrorOptions,
}

/// Which optional fields validation errors carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorOptions {
    pub schema: bool,
    pub validator_value: bool,
    pub messages: bool,
}

impl Default for ErrorOptions {
    fn default() -> Self {
        Self {
            schema: true,
            validator_value: true,
            messages: true,
        }
    }
}

/// Builds a [`Validator`] from a list of schemas.
///
/// Schemas are addressed by their `id`, or by their position in the list
/// when they have none.
///
/// ```
/// use serde_json::json;
/// use verdict::Compiler;
///
/// let mut compiler = Compiler::new();
/// compiler.add_schema(json!({"id": "name", "type": "string", "minLength": 1}));
/// let validator = compiler.compile()?;
///
/// let report = validator.validate(&mut json!(""), "name")?;
/// assert!(!report.valid);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Default)]
pub struct Compiler {
    schemas: Vec<Value>,
    options: Options,
    extensions: Extensions,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: Options) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Applies `default` values to instances during validation. Defaults
    /// added by a failing branch are taken back out.
    pub fn enable_defaults(&mut self) {
        self.options.enable_defaults = true;
    }

    /// Validates each schema against the draft-04 meta-schema before
    /// compiling it.
    pub fn enable_schema_validation(&mut self) {
        self.options.validate_schemas = true;
    }

    pub fn set_error_options(&mut self, errors: ErrorOptions) {
        self.options.errors = errors;
    }

    pub fn add_schema(&mut self, schema: Value) {
        self.schemas.push(schema);
    }

    /// Registers a predicate for `format` values. Built-in names cannot be
    /// replaced.
    pub fn register_format<F>(&mut self, name: &str, func: F) -> Result<(), CompileError>
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.extensions.register_format(name, Arc::new(func))
    }

    pub fn register_keyword<K>(
        &mut self,
        name: &str,
        meta: KeywordMeta,
        keyword: K,
    ) -> Result<(), CompileError>
    where
        K: Keyword + 'static,
    {
        self.extensions.register_keyword(name, meta, Arc::new(keyword))
    }

    pub fn register_transformer<F>(
        &mut self,
        name: &str,
        phase: Phase,
        func: F,
    ) -> Result<(), CompileError>
    where
        F: Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    {
        self.extensions.register_transformer(name, phase, Arc::new(func))
    }

    pub fn compile(&self) -> Result<Validator, CompileError> {
        if self.options.validate_schemas {
            self.validate_schemas()?;
        }
        let registry = Registry::build(self.schemas.clone())?;

        let mut units = Units {
            reg: &registry,
            ext: &self.extensions,
            list: vec![],
            map: AHashMap::new(),
            queue: VecDeque::new(),
        };
        let mut roots = AHashMap::new();
        for (id, node) in registry.roots() {
            roots.insert(id.to_owned(), units.enqueue(node));
        }
        while let Some(node) = units.queue.pop_front() {
            let unit = units.compile(node)?;
            units.list.push(unit);
        }

        let paths = units
            .map
            .iter()
            .map(|(path, &u)| (path.to_string(), u))
            .collect();
        let uses_custom = units.list.iter().any(Unit::has_custom_keyword);
        debug!(
            schemas = roots.len(),
            units = units.list.len(),
            "compiled validator"
        );
        Ok(Validator {
            units: units.list,
            roots,
            paths,
            options: self.options.clone(),
            needs_root: uses_custom,
        })
    }

    fn validate_schemas(&self) -> Result<(), CompileError> {
        let mut meta = Compiler::new();
        meta.add_schema(serde_json::from_str(DRAFT4).map_err(CompileError::MetaSchema)?);
        let meta = meta.compile()?;
        for (position, schema) in self.schemas.iter().enumerate() {
            let report = meta
                .validate_with(&mut schema.clone(), DRAFT4_ID, Algorithm::BestMatch)
                .map_err(|_| CompileError::MetaSchemaMissing)?;
            if !report.valid {
                return Err(CompileError::InvalidSchema {
                    position,
                    report: Box::new(report),
                });
            }
        }
        Ok(())
    }
}

/// Compiles `schemas` with `options`. Shorthand for [`Compiler`].
pub fn compile<I>(schemas: I, options: Options) -> Result<Validator, CompileError>
where
    I: IntoIterator<Item = Value>,
{
    let mut compiler = Compiler::with_options(options);
    for schema in schemas {
        compiler.add_schema(schema);
    }
    compiler.compile()
}

// Units --

/// Compiles registry nodes into units. A unit index is handed out when a
/// path is first enqueued, before its body is compiled, so references
/// back to a node being compiled just reuse that index.
struct Units<'r> {
    reg: &'r Registry,
    ext: &'r Extensions,
    list: Vec<Unit>,
    map: AHashMap<&'r str, UnitId>,
    queue: VecDeque<NodeId>,
}

impl<'r> Units<'r> {
    fn enqueue(&mut self, node: NodeId) -> UnitId {
        let reg = self.reg;
        let path = reg.nodes[node].path.as_str();
        if let Some(&u) = self.map.get(path) {
            return u;
        }
        let u = self.map.len();
        self.map.insert(path, u);
        self.queue.push_back(node);
        u
    }

    /// enqueues the subschema at `<path>/<suffix>`.
    fn child(&mut self, path: &str, keyword: &str, suffix: &str) -> Result<UnitId, CompileError> {
        let child_path = format!("{path}/{suffix}");
        match self.reg.lookup(&child_path) {
            Some(node) => Ok(self.enqueue(node)),
            None => Err(invalid(path, keyword, format!("{suffix} must be an object"))),
        }
    }

    fn compile(&mut self, node: NodeId) -> Result<Unit, CompileError> {
        let reg = self.reg;
        let path = reg.nodes[node].path.as_str();
        let Some(Value::Object(obj)) = reg.value(node) else {
            return Err(invalid(path, "$ref", "target must be an object".to_owned()));
        };
        let mut unit = Unit {
            path: path.to_owned(),
            schema: Arc::new(Value::Object(obj.clone())),
            default: obj.get("default").cloned(),
            target: None,
            transforms: vec![],
            blocks: vec![],
        };

        // all other keywords next to $ref are ignored
        if let Some(target) = reg.nodes[node].target {
            unit.target = Some(self.enqueue(target));
            trace!(path, target = %reg.nodes[target].path, "compiled ref unit");
            return Ok(unit);
        }

        if let Some(Value::Object(defs)) = obj.get("definitions") {
            for name in defs.keys() {
                self.child(path, "definitions", &format!("definitions/{}", escape(name)))?;
            }
        }

        for (kw, value) in obj {
            if let Some(t) = self.ext.transformer(kw) {
                unit.transforms.push(Transform {
                    phase: t.phase,
                    value: value.clone(),
                    func: t.func.clone(),
                });
            }
        }

        let plan = Plan::new(obj, self.ext);
        for kw in &plan.unknown {
            trace!(path, keyword = kw, "ignoring unknown keyword");
        }
        let regions = plan.regions();
        let last_of = |applies: Applies| regions.iter().rposition(|r| r.applies == applies);
        let (last_array, last_object) = (last_of(Applies::Array), last_of(Applies::Object));

        for (i, region) in regions.iter().enumerate() {
            let mut steps = vec![];
            for planned in plan.keywords_in(region) {
                if let Some(step) = self.step(path, obj, planned)? {
                    steps.push(step);
                }
            }
            if Some(i) == last_array {
                if let Some(items) = self.items(path, obj)? {
                    steps.push(Step::Items(items));
                }
            }
            if Some(i) == last_object {
                steps.push(Step::Object(Box::new(self.object(path, obj)?)));
            }
            if !steps.is_empty() {
                unit.blocks.push(Block {
                    guard: region.applies,
                    steps,
                });
            }
        }
        trace!(path, blocks = unit.blocks.len(), "compiled unit");
        Ok(unit)
    }

    /// scalar check for one planned keyword. keywords evaluated by the
    /// fused item and object passes yield `None`.
    fn step(
        &mut self,
        path: &str,
        obj: &Map<String, Value>,
        planned: &Planned,
    ) -> Result<Option<Step>, CompileError> {
        let kw = planned.keyword;
        let v = &obj[kw];
        if planned.custom {
            let Some(custom) = self.ext.keyword(kw) else {
                return Ok(None);
            };
            return Ok(Some(Step::Custom {
                keyword: kw.to_owned(),
                value: v.clone(),
                imp: custom.imp.clone(),
            }));
        }

        let step = match kw {
            "type" => Step::Type(dedup_types(types(path, v)?)),
            "enum" => match v {
                Value::Array(values) => Step::Enum(values.clone()),
                _ => return Err(invalid(path, kw, "must be an array".to_owned())),
            },
            "multipleOf" => match v.as_f64() {
                Some(m) if m > 0.0 => Step::MultipleOf(m),
                _ => return Err(invalid(path, kw, "must be a number above 0".to_owned())),
            },
            "minimum" | "maximum" => {
                let limit = number(path, kw, v)?;
                let modifier = if kw == "minimum" {
                    "exclusiveMinimum"
                } else {
                    "exclusiveMaximum"
                };
                let exclusive = obj.get(modifier) == Some(&Value::Bool(true));
                if kw == "minimum" {
                    Step::Minimum { limit, exclusive }
                } else {
                    Step::Maximum { limit, exclusive }
                }
            }
            "exclusiveMinimum" | "exclusiveMaximum" => {
                boolean(path, kw, v)?;
                return Ok(None);
            }
            "minLength" => Step::MinLength(count(path, kw, v)?),
            "maxLength" => Step::MaxLength(count(path, kw, v)?),
            "pattern" => Step::Pattern(compile_regex(path, v)?),
            "format" => {
                let Value::String(name) = v else {
                    return Err(invalid(path, kw, "must be a string".to_owned()));
                };
                match self.ext.format(name) {
                    Some(format) => Step::Format(format.clone()),
                    None => {
                        return Err(CompileError::UnknownFormat {
                            path: path.to_owned(),
                            format: name.clone(),
                        })
                    }
                }
            }
            "additionalItems" => match (v, obj.get("items")) {
                (Value::Bool(false), Some(Value::Array(items))) => Step::AdditionalItems {
                    max: items.len(),
                },
                (Value::Bool(_) | Value::Object(_), _) => return Ok(None),
                _ => return Err(invalid(path, kw, "must be a boolean or an object".to_owned())),
            },
            "minItems" => Step::MinItems(count(path, kw, v)?),
            "maxItems" => Step::MaxItems(count(path, kw, v)?),
            "uniqueItems" => match boolean(path, kw, v)? {
                true => Step::UniqueItems,
                false => return Ok(None),
            },
            "allOf" => Step::AllOf(self.branches(path, kw, v)?),
            "anyOf" => Step::AnyOf(self.branches(path, kw, v)?),
            "oneOf" => Step::OneOf(self.branches(path, kw, v)?),
            "not" => Step::Not(self.child(path, kw, kw)?),
            _ => return Ok(None),
        };
        Ok(Some(step))
    }

    fn branches(&mut self, path: &str, kw: &str, v: &Value) -> Result<Vec<UnitId>, CompileError> {
        match v {
            Value::Array(arr) if !arr.is_empty() => (0..arr.len())
                .map(|i| self.child(path, kw, &format!("{kw}/{i}")))
                .collect(),
            _ => Err(invalid(path, kw, "must be a non-empty array".to_owned())),
        }
    }

    fn items(&mut self, path: &str, obj: &Map<String, Value>) -> Result<Option<Items>, CompileError> {
        let items = match obj.get("items") {
            None => return Ok(None),
            Some(Value::Object(_)) => Items::All(self.child(path, "items", "items")?),
            Some(Value::Array(arr)) => {
                let items = (0..arr.len())
                    .map(|i| self.child(path, "items", &format!("items/{i}")))
                    .collect::<Result<_, _>>()?;
                let additional = match obj.get("additionalItems") {
                    Some(Value::Object(_)) => {
                        Some(self.child(path, "additionalItems", "additionalItems")?)
                    }
                    _ => None,
                };
                Items::Tuple { items, additional }
            }
            Some(_) => return Err(invalid(path, "items", "must be an object or an array".to_owned())),
        };
        Ok(Some(items))
    }

    fn object(&mut self, path: &str, obj: &Map<String, Value>) -> Result<ObjectPlan, CompileError> {
        let mut plan = ObjectPlan::default();

        if let Some(v) = obj.get("properties") {
            let Value::Object(props) = v else {
                return Err(invalid(path, "properties", "must be an object".to_owned()));
            };
            for pname in props.keys() {
                let suffix = format!("properties/{}", escape(pname));
                let child = self.child(path, "properties", &suffix)?;
                plan.index.insert(pname.clone(), plan.properties.len());
                plan.properties.push((pname.clone(), child));
            }
        }

        if let Some(v) = obj.get("patternProperties") {
            let Value::Object(props) = v else {
                return Err(invalid(path, "patternProperties", "must be an object".to_owned()));
            };
            for pattern in props.keys() {
                let suffix = format!("patternProperties/{}", escape(pattern));
                let child = self.child(path, "patternProperties", &suffix)?;
                let re = compile_regex(path, &Value::String(pattern.clone()))?;
                plan.pattern_properties.push((re, child));
            }
        }

        plan.additional = match obj.get("additionalProperties") {
            None | Some(Value::Bool(true)) => None,
            Some(Value::Bool(false)) => Some(Additional::Forbid),
            Some(Value::Object(_)) => Some(Additional::Schema(self.child(
                path,
                "additionalProperties",
                "additionalProperties",
            )?)),
            Some(_) => {
                return Err(invalid(
                    path,
                    "additionalProperties",
                    "must be a boolean or an object".to_owned(),
                ))
            }
        };

        if let Some(v) = obj.get("required") {
            plan.required = strings(path, "required", v)?;
        }
        if let Some(v) = obj.get("minProperties") {
            plan.min_properties = Some(count(path, "minProperties", v)?);
        }
        if let Some(v) = obj.get("maxProperties") {
            plan.max_properties = Some(count(path, "maxProperties", v)?);
        }

        if let Some(v) = obj.get("dependencies") {
            let Value::Object(deps) = v else {
                return Err(invalid(path, "dependencies", "must be an object".to_owned()));
            };
            for (pname, dep) in deps {
                let dep = match dep {
                    Value::Array(_) => Dependency::Keys(strings(path, "dependencies", dep)?),
                    _ => {
                        let suffix = format!("dependencies/{}", escape(pname));
                        Dependency::Schema(self.child(path, "dependencies", &suffix)?)
                    }
                };
                plan.dependencies.insert(pname.clone(), dep);
            }
        }
        Ok(plan)
    }
}

// keyword value parsing --

fn invalid(path: &str, keyword: &str, reason: String) -> CompileError {
    CompileError::InvalidKeyword {
        path: path.to_owned(),
        keyword: keyword.to_owned(),
        reason,
    }
}

fn number(path: &str, kw: &str, v: &Value) -> Result<f64, CompileError> {
    v.as_f64()
        .ok_or_else(|| invalid(path, kw, "must be a number".to_owned()))
}

fn boolean(path: &str, kw: &str, v: &Value) -> Result<bool, CompileError> {
    v.as_bool()
        .ok_or_else(|| invalid(path, kw, "must be a boolean".to_owned()))
}

fn count(path: &str, kw: &str, v: &Value) -> Result<usize, CompileError> {
    let n = match v {
        Value::Number(n) if is_integer(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && *f <= u32::MAX as f64)
                .map(|f| f as u64)
        }),
        _ => None,
    };
    n.map(|n| n as usize)
        .ok_or_else(|| invalid(path, kw, "must be a non-negative integer".to_owned()))
}

fn strings(path: &str, kw: &str, v: &Value) -> Result<Vec<String>, CompileError> {
    let err = || invalid(path, kw, "must be an array of strings".to_owned());
    let Value::Array(arr) = v else {
        return Err(err());
    };
    arr.iter()
        .map(|s| s.as_str().map(str::to_owned).ok_or_else(err))
        .collect()
}

fn types(path: &str, v: &Value) -> Result<Vec<Type>, CompileError> {
    let err = || invalid(path, "type", format!("unknown type {v}"));
    match v {
        Value::String(name) => Ok(vec![Type::from_name(name).ok_or_else(err)?]),
        Value::Array(names) => names
            .iter()
            .map(|name| name.as_str().and_then(Type::from_name).ok_or_else(err))
            .collect(),
        _ => Err(err()),
    }
}

fn compile_regex(path: &str, v: &Value) -> Result<Regex, CompileError> {
    let Value::String(pattern) = v else {
        return Err(invalid(path, "pattern", "must be a string".to_owned()));
    };
    Regex::new(pattern).map_err(|src| CompileError::InvalidRegex {
        path: path.to_owned(),
        pattern: pattern.clone(),
        src,
    })
}

/// Schema or extension configuration that cannot be compiled.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("schema at position {position} is not an object")]
    NotAnObject { position: usize },

    #[error("schema at position {position} has an invalid id")]
    InvalidId { position: usize },

    #[error("duplicate schema id {id:?}")]
    DuplicateId { id: String },

    #[error("$ref {reference:?} in {path} cannot be resolved")]
    UnresolvedRef { path: String, reference: String },

    #[error("$ref in {path} refers back to itself")]
    RefCycle { path: String },

    #[error("invalid {keyword} in {path}: {reason}")]
    InvalidKeyword {
        path: String,
        keyword: String,
        reason: String,
    },

    #[error("invalid regex {pattern:?} in {path}")]
    InvalidRegex {
        path: String,
        pattern: String,
        #[source]
        src: regex::Error,
    },

    #[error("unknown format {format:?} in {path}")]
    UnknownFormat { path: String, format: String },

    #[error("{kind} {name:?} is already registered")]
    DuplicateRegistration { kind: &'static str, name: String },

    #[error("schema at position {position} is not a valid draft-04 schema: {report}")]
    InvalidSchema { position: usize, report: Box<Report> },

    #[error("draft-04 meta-schema cannot be parsed")]
    MetaSchema(#[source] serde_json::Error),

    #[error("draft-04 meta-schema is not loaded")]
    MetaSchemaMissing,
}
