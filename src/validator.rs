use std::{fmt::Write, mem};

use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::{undo::Undo, util::*, *};

/// Validates `v` against unit `id`. Defaults of a failing validation are
/// rolled back before returning.
pub(crate) fn validate(set: &Validator, id: UnitId, v: &mut Value) -> Report {
    let snapshot = set.needs_root.then(|| v.clone());
    let engine = Engine {
        units: &set.units,
        defaults: set.options.enable_defaults,
        opts: &set.options.errors,
        root: snapshot.as_ref(),
    };
    let mut vloc = Vec::with_capacity(8);
    let mut report = engine.validate(id, v, None, JsonPointer::new(&mut vloc));
    let undo = mem::take(&mut report.undo);
    if !report.valid {
        undo.rollback(v, "");
    }
    debug!(
        schema = %set.units[id].path,
        valid = report.valid,
        errors = report.errors.len(),
        passed = report.passed,
        "validated"
    );
    report
}

struct Engine<'a> {
    units: &'a [Unit],
    defaults: bool,
    opts: &'a ErrorOptions,
    root: Option<&'a Value>,
}

impl<'a> Engine<'a> {
    fn validate(
        &self,
        id: UnitId,
        v: &mut Value,
        parent: Option<&Value>,
        mut vloc: JsonPointer<'_>,
    ) -> Report {
        let u = &self.units[id];
        if let Some(target) = u.target {
            return self.validate(target, v, parent, vloc);
        }

        for t in u.transforms.iter().filter(|t| t.phase == Phase::Pre) {
            let out = (t.func)(&*v, &t.value);
            *v = out;
        }

        let mut r = Report::default();
        let ty = Type::of(v);
        if self.defaults {
            // array keywords see the filled tuple
            if let (Some(items), Value::Array(arr)) = (tuple_items(u), &mut *v) {
                self.apply_item_defaults(items, arr, &vloc, &mut r);
            }
        }
        let mut len = None;
        for block in u.blocks.iter().filter(|b| ty.is(b.guard)) {
            for step in &block.steps {
                match step {
                    Step::Type(_) | Step::Enum(_) | Step::Custom { .. } => {
                        self.any_validate(u, step, ty, v, parent, &vloc, &mut r)
                    }
                    Step::MultipleOf(_) | Step::Minimum { .. } | Step::Maximum { .. } => {
                        self.num_validate(u, step, v, &vloc, &mut r)
                    }
                    Step::MinLength(_) | Step::MaxLength(_) | Step::Pattern(_) | Step::Format(_) => {
                        self.str_validate(u, step, v, &vloc, &mut r, &mut len)
                    }
                    Step::AdditionalItems { .. }
                    | Step::MinItems(_)
                    | Step::MaxItems(_)
                    | Step::UniqueItems
                    | Step::Items(_) => self.arr_validate(u, step, v, vloc.copy(), &mut r),
                    Step::Object(plan) => self.obj_validate(u, plan, v, parent, vloc.copy(), &mut r),
                    Step::AllOf(_) | Step::AnyOf(_) | Step::OneOf(_) | Step::Not(_) => {
                        self.cond_validate(u, step, v, parent, vloc.copy(), &mut r)
                    }
                }
            }
        }

        if r.valid {
            for t in u.transforms.iter().filter(|t| t.phase == Phase::Post) {
                let out = (t.func)(&*v, &t.value);
                *v = out;
            }
        }
        r
    }

    #[allow(clippy::too_many_arguments)]
    fn any_validate(
        &self,
        u: &Unit,
        step: &Step,
        ty: Type,
        v: &Value,
        parent: Option<&Value>,
        vloc: &JsonPointer<'_>,
        r: &mut Report,
    ) {
        match step {
            // type --
            Step::Type(want) => {
                let ok = want.iter().any(|t| ty.matches(*t));
                self.check(r, ok, || {
                    self.error(u, ErrorCode::InvalidType, "type", v, vloc, || {
                        format!("Data should be of type {} not {ty}", join_iter(want, ", "))
                    })
                });
            }

            // enum --
            Step::Enum(list) => {
                let ok = list.iter().any(|e| equals(e, v));
                self.check(r, ok, || {
                    self.error(u, ErrorCode::EnumMismatch, "enum", v, vloc, || {
                        let want = Value::Array(list.clone());
                        format!("{} is not one of {}", inspect(v), inspect(&want))
                    })
                });
            }

            // custom keywords --
            Step::Custom {
                keyword,
                value,
                imp,
            } => match imp.validate(value, v, parent, self.root) {
                Ok(()) => r.passed += 1,
                Err(violation) => {
                    let code = ErrorCode::Custom(violation.code);
                    let message = violation.message;
                    r.add_error(self.error(u, code, keyword, v, vloc, || message));
                }
            },
            _ => {}
        }
    }

    fn num_validate(&self, u: &Unit, step: &Step, v: &Value, vloc: &JsonPointer<'_>, r: &mut Report) {
        let Some(n) = v.as_f64() else {
            return;
        };
        let limit_of = |kw: &str| inspect(&u.schema[kw]);
        match step {
            // multipleOf --
            Step::MultipleOf(m) => {
                let q = n / m;
                let ok = q.is_finite() && q.fract() == 0.0;
                self.check(r, ok, || {
                    self.error(u, ErrorCode::MultipleOf, "multipleOf", v, vloc, || {
                        format!("{} is not a multiple of {}", inspect(v), limit_of("multipleOf"))
                    })
                });
            }

            // minimum --
            Step::Minimum { limit, exclusive } => {
                if *exclusive {
                    self.check(r, n > *limit, || {
                        let code = ErrorCode::MinimumExclusive;
                        self.error(u, code, "exclusiveMinimum", v, vloc, || {
                            format!(
                                "{} is less than or equal to the minimum of {}",
                                inspect(v),
                                limit_of("minimum")
                            )
                        })
                    });
                } else {
                    self.check(r, n >= *limit, || {
                        self.error(u, ErrorCode::Minimum, "minimum", v, vloc, || {
                            format!("{} is less than the minimum of {}", inspect(v), limit_of("minimum"))
                        })
                    });
                }
            }

            // maximum --
            Step::Maximum { limit, exclusive } => {
                if *exclusive {
                    self.check(r, n < *limit, || {
                        let code = ErrorCode::MaximumExclusive;
                        self.error(u, code, "exclusiveMaximum", v, vloc, || {
                            format!(
                                "{} is greater than or equal to the maximum of {}",
                                inspect(v),
                                limit_of("maximum")
                            )
                        })
                    });
                } else {
                    self.check(r, n <= *limit, || {
                        self.error(u, ErrorCode::Maximum, "maximum", v, vloc, || {
                            format!(
                                "{} is greater than the maximum of {}",
                                inspect(v),
                                limit_of("maximum")
                            )
                        })
                    });
                }
            }
            _ => {}
        }
    }

    fn str_validate(
        &self,
        u: &Unit,
        step: &Step,
        v: &Value,
        vloc: &JsonPointer<'_>,
        r: &mut Report,
        len: &mut Option<usize>,
    ) {
        let Value::String(s) = v else {
            return;
        };
        match step {
            // minLength --
            Step::MinLength(min) => {
                let len = *len.get_or_insert_with(|| s.chars().count());
                self.check(r, len >= *min, || {
                    self.error(u, ErrorCode::MinLength, "minLength", v, vloc, || {
                        format!("{} is too short, minimum {min}", inspect(v))
                    })
                });
            }

            // maxLength --
            Step::MaxLength(max) => {
                let len = *len.get_or_insert_with(|| s.chars().count());
                self.check(r, len <= *max, || {
                    self.error(u, ErrorCode::MaxLength, "maxLength", v, vloc, || {
                        format!("{} is too long, maximum {max}", inspect(v))
                    })
                });
            }

            // pattern --
            Step::Pattern(re) => {
                self.check(r, re.is_match(s), || {
                    self.error(u, ErrorCode::Pattern, "pattern", v, vloc, || {
                        format!("{} should match the pattern {}", inspect(v), re.as_str())
                    })
                });
            }

            // format --
            Step::Format(format) => {
                self.check(r, (format.func)(s), || {
                    self.error(u, ErrorCode::InvalidFormat, "format", v, vloc, || {
                        format!("{} should match format {}", inspect(v), format.name)
                    })
                });
            }
            _ => {}
        }
    }

    fn arr_validate(
        &self,
        u: &Unit,
        step: &Step,
        v: &mut Value,
        mut vloc: JsonPointer<'_>,
        r: &mut Report,
    ) {
        let Value::Array(arr) = v else {
            return;
        };
        match step {
            // additionalItems --
            Step::AdditionalItems { max } => {
                let ok = arr.len() <= *max;
                let v = &*v;
                self.check(r, ok, || {
                    self.error(u, ErrorCode::ArrayAdditionalItems, "additionalItems", v, &vloc, || {
                        let extra = v.as_array().map_or(&[][..], |arr| &arr[*max..]);
                        format!(
                            "Additional items not allowed, {} is unexpected",
                            inspect(&Value::Array(extra.to_vec()))
                        )
                    })
                });
            }

            // minItems --
            Step::MinItems(min) => {
                let ok = arr.len() >= *min;
                self.check(r, ok, || {
                    self.error(u, ErrorCode::ArrayLengthShort, "minItems", v, &vloc, || {
                        format!("Array is too short, minimum {min}")
                    })
                });
            }

            // maxItems --
            Step::MaxItems(max) => {
                let ok = arr.len() <= *max;
                self.check(r, ok, || {
                    self.error(u, ErrorCode::ArrayLengthLong, "maxItems", v, &vloc, || {
                        format!("Array is too long, maximum {max}")
                    })
                });
            }

            // uniqueItems --
            Step::UniqueItems => {
                let dup = (1..arr.len())
                    .find_map(|j| (0..j).find(|&i| equals(&arr[i], &arr[j])).map(|i| [i, j]));
                match dup {
                    None => r.passed += 1,
                    Some(pair) => {
                        let mut e = self.error(u, ErrorCode::ArrayUnique, "uniqueItems", v, &vloc, || {
                            "Array has non unique elements".to_owned()
                        });
                        e.params = Some(json!({ "actual": pair }));
                        r.add_error(e);
                    }
                }
            }

            // items --
            Step::Items(items) => {
                // newest index first
                for i in (0..arr.len()).rev() {
                    let child = match items {
                        Items::All(child) => Some(*child),
                        Items::Tuple { items, additional } => items.get(i).copied().or(*additional),
                    };
                    if let Some(child) = child {
                        r.merge(self.validate_item(child, v, i, vloc.copy()));
                    }
                }
            }
            _ => {}
        }
    }

    fn obj_validate(
        &self,
        u: &Unit,
        plan: &ObjectPlan,
        v: &mut Value,
        parent: Option<&Value>,
        mut vloc: JsonPointer<'_>,
        r: &mut Report,
    ) {
        let Value::Object(obj) = v else {
            return;
        };
        let keys: Vec<String> = obj.keys().cloned().collect();
        let mut additional = vec![];

        for pname in &keys {
            let mut evaluated = false;

            // properties --
            if let Some(child) = plan.property(pname) {
                r.merge(self.validate_prop(child, v, pname, vloc.copy()));
                evaluated = true;
            }

            // dependencies --
            match plan.dependencies.get(pname) {
                Some(Dependency::Keys(keys)) => {
                    let ok = keys.iter().all(|k| v.get(k).is_some());
                    self.check(r, ok, || {
                        self.error(u, ErrorCode::ObjectDependencyKey, "dependencies", v, &vloc, || {
                            let want = Value::from(keys.clone());
                            format!(
                                "The keys {} must exist due to key {}",
                                inspect(&want),
                                Value::String(pname.clone())
                            )
                        })
                    });
                }
                Some(Dependency::Schema(child)) => {
                    r.merge(self.validate(*child, v, parent, vloc.copy()));
                }
                None => {}
            }

            // patternProperties --
            for (re, child) in &plan.pattern_properties {
                if re.is_match(pname) {
                    r.merge(self.validate_prop(*child, v, pname, vloc.copy()));
                    evaluated = true;
                }
            }

            // additionalProperties --
            if !evaluated {
                match &plan.additional {
                    Some(Additional::Schema(child)) => {
                        r.merge(self.validate_prop(*child, v, pname, vloc.copy()));
                    }
                    Some(Additional::Forbid) => additional.push(pname.clone()),
                    None => {}
                }
            }
        }

        if self.defaults {
            self.apply_prop_defaults(plan, v, vloc.copy(), r);
        }
        let count = v.as_object().map_or(0, |obj| obj.len());

        // required --
        for pname in plan.required.iter().rev() {
            let ok = v.get(pname).is_some();
            self.check(r, ok, || {
                self.error(u, ErrorCode::ObjectMissingRequiredProperty, "required", v, &vloc, || {
                    format!("The required property {} is missing", quote(pname))
                })
            });
        }

        if let Some(Additional::Forbid) = plan.additional {
            self.check(r, additional.is_empty(), || {
                let code = ErrorCode::ObjectAdditionalProperties;
                self.error(u, code, "additionalProperties", v, &vloc, || {
                    format!(
                        "Additional properties not allowed, {} is unexpected",
                        inspect(&Value::from(additional.clone()))
                    )
                })
            });
        }

        // minProperties --
        if let Some(min) = plan.min_properties {
            self.check(r, count >= min, || {
                self.error(u, ErrorCode::ObjectPropertiesMinimum, "minProperties", v, &vloc, || {
                    format!("Object has less than the minimum of {min} properties")
                })
            });
        }

        // maxProperties --
        if let Some(max) = plan.max_properties {
            self.check(r, count <= max, || {
                self.error(u, ErrorCode::ObjectPropertiesMaximum, "maxProperties", v, &vloc, || {
                    format!("Object has more than the maximum of {max} properties")
                })
            });
        }
    }

    fn cond_validate(
        &self,
        u: &Unit,
        step: &Step,
        v: &mut Value,
        parent: Option<&Value>,
        mut vloc: JsonPointer<'_>,
        r: &mut Report,
    ) {
        match step {
            // allOf --
            Step::AllOf(branches) => {
                let (mut passed, mut undo, mut failed) = (0, Undo::default(), vec![]);
                for &b in branches {
                    let mut sub = self.validate(b, v, parent, vloc.copy());
                    if sub.valid {
                        passed += sub.passed;
                        undo.append(mem::take(&mut sub.undo));
                    } else {
                        self.rollback(mem::take(&mut sub.undo), v, &vloc);
                        failed.push(sub);
                    }
                }
                if failed.is_empty() {
                    r.passed += passed;
                    r.undo.append(undo);
                } else {
                    self.rollback(undo, v, &vloc);
                    let mut e = self.error(u, ErrorCode::AllOfFailed, "allOf", v, &vloc, || {
                        "Data is not valid under all of the given schemas".to_owned()
                    });
                    e.context = failed;
                    r.add_error(e);
                }
            }

            // anyOf --
            Step::AnyOf(branches) => {
                let mut failed = vec![];
                for &b in branches {
                    let mut sub = self.validate(b, v, parent, vloc.copy());
                    if sub.valid {
                        r.passed += sub.passed;
                        r.undo.append(sub.undo);
                        return;
                    }
                    self.rollback(mem::take(&mut sub.undo), v, &vloc);
                    failed.push(sub);
                }
                let mut e = self.error(u, ErrorCode::AnyOfMissing, "anyOf", v, &vloc, || {
                    "Data is not valid under any of the given schemas".to_owned()
                });
                e.context = failed;
                r.add_error(e);
            }

            // oneOf --
            Step::OneOf(branches) => {
                let (mut matched, mut failed) = (vec![], vec![]);
                for &b in branches {
                    // each branch sees the instance without its siblings' defaults
                    let mut sub = self.validate(b, v, parent, vloc.copy());
                    let filled = !sub.undo.is_empty();
                    self.rollback(mem::take(&mut sub.undo), v, &vloc);
                    if sub.valid {
                        matched.push((b, sub, filled));
                    } else {
                        failed.push(sub);
                    }
                }
                if matched.len() == 1 {
                    let (b, mut sub, filled) = matched.swap_remove(0);
                    if filled {
                        // put the winner's defaults back
                        sub = self.validate(b, v, parent, vloc.copy());
                    }
                    if sub.valid {
                        r.passed += sub.passed;
                        r.undo.append(sub.undo);
                    } else {
                        self.rollback(mem::take(&mut sub.undo), v, &vloc);
                        r.merge(sub);
                    }
                } else if matched.is_empty() {
                    let mut e = self.error(u, ErrorCode::OneOfMissing, "oneOf", v, &vloc, || {
                        "Data is not valid under any of the given schemas".to_owned()
                    });
                    e.context = failed;
                    r.add_error(e);
                } else {
                    let mut e = self.error(u, ErrorCode::OneOfMultiple, "oneOf", v, &vloc, || {
                        "Data is valid under each of the given schemas, but should be valid under only one of them"
                            .to_owned()
                    });
                    e.context = matched
                        .into_iter()
                        .map(|(b, ..)| Report {
                            schema: Some(self.units[b].schema.clone()),
                            ..Report::default()
                        })
                        .collect();
                    r.add_error(e);
                }
            }

            // not --
            Step::Not(inner) => {
                let mut sub = self.validate(*inner, v, parent, vloc.copy());
                self.rollback(mem::take(&mut sub.undo), v, &vloc);
                self.check(r, !sub.valid, || {
                    self.error(u, ErrorCode::NotPassed, "not", v, &vloc, || {
                        "Data should not match the given schema".to_owned()
                    })
                });
            }
            _ => {}
        }
    }
}

// defaults
impl<'a> Engine<'a> {
    /// the unit's own default, else that of the unit it refers to.
    fn default_of(&self, mut id: UnitId) -> Option<&'a Value> {
        let units = self.units;
        loop {
            let u = &units[id];
            if let Some(default) = &u.default {
                return Some(default);
            }
            id = u.target?;
        }
    }

    fn apply_prop_defaults(
        &self,
        plan: &ObjectPlan,
        v: &mut Value,
        mut vloc: JsonPointer<'_>,
        r: &mut Report,
    ) {
        for (pname, child) in &plan.properties {
            let Some(obj) = v.as_object_mut() else {
                return;
            };
            if obj.contains_key(pname) {
                continue;
            }
            let Some(default) = self.default_of(*child) else {
                continue;
            };
            obj.insert(pname.clone(), default.clone());
            let at = vloc.to_string();
            trace!(at = %at, property = %pname, "applied default");
            r.undo.inserted(at, pname.clone());
            r.merge(self.validate_prop(*child, v, pname, vloc.copy()));
        }
    }

    /// fills missing tuple positions until one has no default.
    fn apply_item_defaults(
        &self,
        items: &[UnitId],
        arr: &mut Vec<Value>,
        vloc: &JsonPointer<'_>,
        r: &mut Report,
    ) {
        let len = arr.len();
        for &child in items.iter().skip(len) {
            match self.default_of(child) {
                Some(default) => arr.push(default.clone()),
                None => break,
            }
        }
        if arr.len() > len {
            let at = vloc.to_string();
            trace!(at = %at, items = arr.len() - len, "applied item defaults");
            r.undo.appended(at, len);
        }
    }

    fn rollback(&self, undo: Undo, v: &mut Value, vloc: &JsonPointer<'_>) {
        if !undo.is_empty() {
            undo.rollback(v, &vloc.to_string());
        }
    }
}

/// positional `items` of `u`, if any.
fn tuple_items(u: &Unit) -> Option<&[UnitId]> {
    u.blocks
        .iter()
        .filter(|b| matches!(b.guard, Applies::Array))
        .flat_map(|b| &b.steps)
        .find_map(|step| match step {
            Step::Items(Items::Tuple { items, .. }) => Some(&items[..]),
            _ => None,
        })
}

// validation helpers
impl<'a> Engine<'a> {
    /// takes the value at `slot` out for validation. custom keywords read
    /// the parent, so there it stays in place as read.
    fn take(&self, slot: &mut Value) -> Value {
        if self.root.is_some() {
            slot.clone()
        } else {
            mem::take(slot)
        }
    }

    /// validates property `pname` of object `v`, handing `v` down as its
    /// parent.
    fn validate_prop(&self, child: UnitId, v: &mut Value, pname: &str, mut vloc: JsonPointer<'_>) -> Report {
        let Some(mut pvalue) = v.get_mut(pname).map(|slot| self.take(slot)) else {
            return Report::default();
        };
        let r = self.validate(child, &mut pvalue, Some(&*v), vloc.prop(pname));
        if let Some(slot) = v.get_mut(pname) {
            *slot = pvalue;
        }
        r
    }

    fn validate_item(&self, child: UnitId, v: &mut Value, i: usize, mut vloc: JsonPointer<'_>) -> Report {
        let Some(mut item) = v.get_mut(i).map(|slot| self.take(slot)) else {
            return Report::default();
        };
        let r = self.validate(child, &mut item, Some(&*v), vloc.item(i));
        if let Some(slot) = v.get_mut(i) {
            *slot = item;
        }
        r
    }

    fn check(&self, r: &mut Report, ok: bool, err: impl FnOnce() -> ValidationError) {
        if ok {
            r.passed += 1;
        } else {
            r.add_error(err());
        }
    }
}

// error helpers
impl<'a> Engine<'a> {
    fn error(
        &self,
        u: &Unit,
        code: ErrorCode,
        keyword: &str,
        v: &Value,
        vloc: &JsonPointer<'_>,
        message: impl FnOnce() -> String,
    ) -> ValidationError {
        let kw = escape(keyword);
        ValidationError {
            code,
            path: vloc.to_string(),
            instance: v.clone(),
            message: self.opts.messages.then(message),
            validator: keyword.to_owned(),
            validator_value: if self.opts.validator_value {
                u.schema.get(keyword).cloned()
            } else {
                None
            },
            schema: self.opts.schema.then(|| u.schema.clone()),
            relative_schema_path: format!("/{kw}"),
            absolute_schema_path: format!("{}/{kw}", u.path),
            params: None,
            context: vec![],
        }
    }
}

// JsonPointer --

#[derive(Debug, Clone)]
enum Token {
    Prop(String),
    Item(usize),
}

impl Token {
    fn to_string(tokens: &[Token]) -> String {
        let mut r = String::new();
        for tok in tokens {
            r.push('/');
            match tok {
                Token::Prop(s) => r.push_str(&escape(s)),
                Token::Item(i) => _ = write!(&mut r, "{i}"),
            }
        }
        r
    }
}

/// Instance location of the value being validated. Children share the
/// token buffer, each knowing the length of its own prefix.
struct JsonPointer<'a> {
    vec: &'a mut Vec<Token>,
    len: usize,
}

impl<'a> JsonPointer<'a> {
    fn new(vec: &'a mut Vec<Token>) -> Self {
        let len = vec.len();
        Self { vec, len }
    }

    fn copy<'x>(&'x mut self) -> JsonPointer<'x> {
        JsonPointer {
            vec: &mut *self.vec,
            len: self.len,
        }
    }

    fn prop<'x>(&'x mut self, name: &str) -> JsonPointer<'x> {
        self.vec.truncate(self.len);
        self.vec.push(Token::Prop(name.to_owned()));
        JsonPointer::new(self.vec)
    }

    fn item<'x>(&'x mut self, i: usize) -> JsonPointer<'x> {
        self.vec.truncate(self.len);
        self.vec.push(Token::Item(i));
        JsonPointer::new(self.vec)
    }
}

impl<'a> std::fmt::Display for JsonPointer<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&Token::to_string(&self.vec[..self.len]))
    }
}
