use std::error::Error;

use serde_json::{json, Value};
use verdict::{Compiler, Validator};

fn validator(schema: Value) -> Result<Validator, Box<dyn Error>> {
    let mut compiler = Compiler::new();
    compiler.enable_defaults();
    compiler.add_schema(schema);
    Ok(compiler.compile()?)
}

/// validates `data` in place against the single schema `id`.
fn check(v: &Validator, id: &str, data: &mut Value) -> Result<bool, Box<dyn Error>> {
    Ok(v.validate(data, id)?.valid)
}

#[test]
fn test_object_defaults() -> Result<(), Box<dyn Error>> {
    let v = validator(json!({
        "id": "simple_defaults",
        "type": "object",
        "default": {"string": "empty_object", "array": []},
        "required": ["required"],
        "properties": {
            "string": {"type": "string", "default": "normal"},
            "object": {
                "type": "object",
                "default": {"x": 100, "y": 200},
                "properties": {
                    "x": {"type": "number", "default": 0},
                    "y": {"type": "number", "default": 0},
                    "z": {"type": "number", "default": 0}
                }
            },
            "array": {"type": "array", "default": [100, 200, {"x": 1}, "foo", null, true]},
            "number": {"type": "number", "default": 100},
            "required": {"type": "boolean", "default": false}
        }
    }))?;

    let mut data = json!({});
    assert!(check(&v, "simple_defaults", &mut data)?);
    assert_eq!(
        data,
        json!({
            "string": "normal",
            "object": {"x": 100, "y": 200, "z": 0},
            "array": [100, 200, {"x": 1}, "foo", null, true],
            "number": 100,
            "required": false
        })
    );
    // applied in schema order
    let keys: Vec<_> = data.as_object().ok_or("not an object")?.keys().collect();
    assert_eq!(keys, ["string", "object", "array", "number", "required"]);

    let mut data = json!({"string": "partial", "object": {"x": 200}, "number": 10});
    assert!(check(&v, "simple_defaults", &mut data)?);
    assert_eq!(
        data,
        json!({
            "string": "partial",
            "object": {"x": 200, "y": 0, "z": 0},
            "array": [100, 200, {"x": 1}, "foo", null, true],
            "number": 10,
            "required": false
        })
    );
    Ok(())
}

#[test]
fn test_array_defaults() -> Result<(), Box<dyn Error>> {
    let v = validator(json!({
        "id": "array_defaults",
        "type": "object",
        "properties": {
            "dynamic": {
                "type": "array",
                "items": {
                    "default": {"x": 100, "y": 100},
                    "type": "object",
                    "properties": {
                        "x": {"type": "number", "default": 0},
                        "y": {"type": "number", "default": 0}
                    }
                }
            },
            "static": {
                "type": "array",
                "items": [
                    {"type": "number", "default": 0},
                    {"type": "number", "default": 10},
                    {"type": "number", "default": 20}
                ],
                "additionalItems": {"default": 100, "type": "number"}
            }
        }
    }))?;

    let mut data = json!({"dynamic": [{}, {"x": 5}], "static": []});
    assert!(check(&v, "array_defaults", &mut data)?);
    assert_eq!(
        data,
        json!({
            "dynamic": [{"x": 0, "y": 0}, {"x": 5, "y": 0}],
            "static": [0, 10, 20]
        })
    );

    // only missing tail positions are filled
    let mut data = json!({"static": [30]});
    assert!(check(&v, "array_defaults", &mut data)?);
    assert_eq!(data, json!({"static": [30, 10, 20]}));

    let mut data = json!({"static": [1, 2, 3, 4]});
    assert!(check(&v, "array_defaults", &mut data)?);
    assert_eq!(data, json!({"static": [1, 2, 3, 4]}));
    Ok(())
}

#[test]
fn test_tuple_defaults_stop_at_first_gap() -> Result<(), Box<dyn Error>> {
    let v = validator(json!({
        "items": [{"default": "a"}, {}, {"default": "c"}]
    }))?;
    let mut data = json!([]);
    assert!(check(&v, "0", &mut data)?);
    assert_eq!(data, json!(["a"]));
    Ok(())
}

#[test]
fn test_one_of_defaults() -> Result<(), Box<dyn Error>> {
    let v = validator(json!({
        "id": "oneofdefaults",
        "type": "object",
        "properties": {
            "object": {
                "default": {"x": true, "y": false},
                "oneOf": [
                    {"type": "object", "properties": {"x": {"type": "string", "default": "a"}}},
                    {"type": "object", "properties": {"y": {"type": "string", "default": "b"}}},
                    {"type": "object", "properties": {"z": {"type": "string", "default": "c"}}}
                ]
            }
        }
    }))?;

    let mut data = json!({});
    assert!(check(&v, "oneofdefaults", &mut data)?);
    assert_eq!(data, json!({"object": {"x": true, "y": false, "z": "c"}}));

    let mut data = json!({"object": {"x": true, "z": true}});
    assert!(check(&v, "oneofdefaults", &mut data)?);
    assert_eq!(data, json!({"object": {"x": true, "y": "b", "z": true}}));

    // two branches pass once their defaults are in, so none applies
    let mut data = json!({"object": {"x": true}});
    assert!(!check(&v, "oneofdefaults", &mut data)?);
    assert_eq!(data, json!({"object": {"x": true}}));

    let mut data = json!({"object": []});
    assert!(!check(&v, "oneofdefaults", &mut data)?);
    assert_eq!(data, json!({"object": []}));
    Ok(())
}

#[test]
fn test_any_of_defaults() -> Result<(), Box<dyn Error>> {
    let v = validator(json!({
        "id": "anyofdefaults",
        "type": "object",
        "properties": {
            "object": {
                "default": {"p1": true, "p2": true},
                "anyOf": [
                    {
                        "type": "object",
                        "required": ["x"],
                        "properties": {"x": {"type": "string", "default": "a"}},
                        "minProperties": 4
                    },
                    {
                        "type": "object",
                        "properties": {"y": {"type": "string", "default": "b"}},
                        "minProperties": 3
                    },
                    {
                        "type": "object",
                        "required": ["z"],
                        "properties": {"z": {"type": "string", "default": "c"}},
                        "minProperties": 2
                    }
                ]
            }
        }
    }))?;

    // minProperties counts the branch's own defaults
    let cases = [
        (json!({}), json!({"object": {"p1": true, "p2": true, "y": "b"}})),
        (
            json!({"object": {"p1": true, "p2": true, "p3": true}}),
            json!({"object": {"p1": true, "p2": true, "p3": true, "x": "a"}}),
        ),
        (
            json!({"object": {"p1": true}}),
            json!({"object": {"p1": true, "z": "c"}}),
        ),
        (
            json!({"object": {"x": true, "y": true}}),
            json!({"object": {"x": true, "y": true, "z": "c"}}),
        ),
    ];
    for (mut data, want) in cases {
        assert!(check(&v, "anyofdefaults", &mut data)?, "{want}");
        assert_eq!(data, want);
    }

    let mut data = json!({"object": {}});
    assert!(!check(&v, "anyofdefaults", &mut data)?);
    assert_eq!(data, json!({"object": {}}));
    Ok(())
}

#[test]
fn test_all_of_defaults() -> Result<(), Box<dyn Error>> {
    let v = validator(json!({
        "id": "allofdefaults",
        "type": "object",
        "properties": {
            "object": {
                "default": {},
                "allOf": [
                    {"type": "object", "properties": {"x": {"type": "string", "default": "a"}}},
                    {"type": "object", "properties": {"y": {"type": "string", "default": "b"}}},
                    {"type": "object", "properties": {"z": {"type": "string", "default": "c"}}}
                ]
            },
            "array": {
                "default": [],
                "allOf": [
                    {
                        "type": "array",
                        "items": [
                            {"type": "object", "default": {}, "properties": {"x": {"default": "a"}}}
                        ],
                        "additionalItems": true
                    },
                    {
                        "type": "array",
                        "items": [
                            {"type": "object", "default": {}, "properties": {"y": {"default": "b1"}}},
                            {"type": "object", "default": {}, "properties": {"y": {"default": "b2"}}}
                        ],
                        "additionalItems": true
                    },
                    {
                        "type": "array",
                        "items": [
                            {"type": "object", "default": {}},
                            {"type": "object", "default": {}},
                            {"type": "object", "default": {}}
                        ],
                        "additionalItems": {
                            "type": "object",
                            "default": {},
                            "properties": {"z": {"default": "c"}}
                        }
                    }
                ]
            }
        }
    }))?;

    let mut data = json!({});
    assert!(check(&v, "allofdefaults", &mut data)?);
    assert_eq!(
        data,
        json!({
            "object": {"x": "a", "y": "b", "z": "c"},
            "array": [{"x": "a", "y": "b1"}, {"y": "b2"}, {}]
        })
    );

    let mut data = json!({
        "object": {"x": "x"},
        "array": [{"p1": true}, {"p2": true}, {"p3": true}, {"p4": true}]
    });
    assert!(check(&v, "allofdefaults", &mut data)?);
    assert_eq!(
        data,
        json!({
            "object": {"x": "x", "y": "b", "z": "c"},
            "array": [{"p1": true, "x": "a", "y": "b1"}, {"p2": true, "y": "b2"}, {"p3": true}, {"p4": true, "z": "c"}]
        })
    );

    let before = json!({
        "object": {"x": true},
        "array": [{"p1": true}, {"p2": true}, {"p3": true}, {"p4": true}]
    });
    let mut data = before.clone();
    assert!(!check(&v, "allofdefaults", &mut data)?);
    assert_eq!(data, before);
    Ok(())
}

#[test]
fn test_not_defaults() -> Result<(), Box<dyn Error>> {
    let v = validator(json!({
        "id": "notdefaults",
        "type": "object",
        "properties": {
            "object": {
                "default": {},
                "not": {
                    "type": "object",
                    "minProperties": 2,
                    "properties": {"comments": {"type": "string", "default": "too short"}}
                }
            },
            "array": {
                "default": [],
                "not": {
                    "type": "array",
                    "minItems": 2,
                    "items": [{"default": "too short"}]
                }
            }
        }
    }))?;

    let mut data = json!({});
    assert!(check(&v, "notdefaults", &mut data)?);
    assert_eq!(data, json!({"object": {}, "array": []}));

    let mut data = json!({"object": {"x": true}, "array": [true, false]});
    assert!(!check(&v, "notdefaults", &mut data)?);
    assert_eq!(data, json!({"object": {"x": true}, "array": [true, false]}));

    // the filled-in default is what satisfies the inner schema
    let mut data = json!({"object": {"x": true}});
    let report = v.validate(&mut data, "notdefaults")?;
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, "/object");
    assert_eq!(data, json!({"object": {"x": true}}));
    Ok(())
}

#[test]
fn test_ref_default() -> Result<(), Box<dyn Error>> {
    let v = validator(json!({
        "definitions": {"level": {"type": "integer", "default": 3}},
        "properties": {
            "level": {"$ref": "#/definitions/level"},
            "other": {"$ref": "#/definitions/level", "default": 7}
        }
    }))?;
    let mut data = json!({});
    assert!(check(&v, "0", &mut data)?);
    // a default next to $ref overrides the target's
    assert_eq!(data, json!({"level": 3, "other": 7}));
    Ok(())
}

#[test]
fn test_required_sees_defaults() -> Result<(), Box<dyn Error>> {
    let v = validator(json!({
        "properties": {"a": {"default": 1}},
        "required": ["a"]
    }))?;
    let mut data = json!({});
    assert!(check(&v, "0", &mut data)?);
    assert_eq!(data, json!({"a": 1}));
    Ok(())
}

#[test]
fn test_property_counts_see_defaults() -> Result<(), Box<dyn Error>> {
    let v = validator(json!({
        "properties": {"a": {"default": 1}},
        "minProperties": 1
    }))?;
    let mut data = json!({});
    assert!(check(&v, "0", &mut data)?);
    assert_eq!(data, json!({"a": 1}));

    let v = validator(json!({
        "properties": {"a": {"default": 1}},
        "maxProperties": 0
    }))?;
    let mut data = json!({});
    let report = v.validate(&mut data, "0")?;
    assert!(!report.valid);
    assert_eq!(report.errors[0].code.as_str(), "OBJECT_PROPERTIES_MAXIMUM");
    assert_eq!(data, json!({}));
    Ok(())
}

#[test]
fn test_array_checks_see_defaults() -> Result<(), Box<dyn Error>> {
    let v = validator(json!({
        "type": "array",
        "items": [{"default": 1}, {"default": 1}],
        "uniqueItems": true,
        "maxItems": 1
    }))?;
    let mut data = json!([]);
    let report = v.validate(&mut data, "0")?;
    let codes: Vec<_> = report.errors.iter().map(|e| e.code.as_str()).collect();
    assert_eq!(codes, ["ARRAY_LENGTH_LONG", "ARRAY_UNIQUE"]);
    assert_eq!(data, json!([]));

    let v = validator(json!({"items": [{"default": "a"}, {"default": "b"}], "minItems": 2}))?;
    let mut data = json!([]);
    assert!(check(&v, "0", &mut data)?);
    assert_eq!(data, json!(["a", "b"]));
    Ok(())
}

#[test]
fn test_filled_instance_stays_valid() -> Result<(), Box<dyn Error>> {
    let schemas = [
        json!({"items": [{"default": 1}, {"default": 2}], "uniqueItems": true, "maxItems": 2}),
        json!({"properties": {"a": {"default": 1}, "b": {"default": 2}}, "maxProperties": 2}),
        json!({"properties": {"list": {"default": [], "items": [{"default": 0}], "minItems": 1}}}),
    ];
    for schema in schemas {
        let v = validator(schema.clone())?;
        for data in [json!({}), json!([])] {
            let mut data = data;
            if check(&v, "0", &mut data)? {
                let filled = data.clone();
                assert!(check(&v, "0", &mut data)?, "{schema} {filled}");
                assert_eq!(data, filled);
            }
        }
    }
    Ok(())
}

#[test]
fn test_one_of_branches_ignore_sibling_defaults() -> Result<(), Box<dyn Error>> {
    let v = validator(json!({
        "oneOf": [
            {"properties": {"a": {"default": 1}}},
            {"required": ["a"]}
        ]
    }))?;
    let mut data = json!({});
    let report = v.validate(&mut data, "0")?;
    assert!(report.valid, "{report}");
    assert_eq!(data, json!({"a": 1}));

    // with `a` already present both branches pass
    let mut data = json!({"a": 2});
    let report = v.validate(&mut data, "0")?;
    assert_eq!(report.errors[0].code.as_str(), "ONE_OF_MULTIPLE");
    assert_eq!(data, json!({"a": 2}));
    Ok(())
}

#[test]
fn test_invalid_default_rolled_back() -> Result<(), Box<dyn Error>> {
    let v = validator(json!({
        "properties": {
            "a": {"type": "string", "default": "ok"},
            "b": {"type": "integer", "default": "not a number"}
        }
    }))?;
    let mut data = json!({"c": [1]});
    let report = v.validate(&mut data, "0")?;
    assert!(!report.valid);
    assert_eq!(report.errors[0].path, "/b");
    assert_eq!(data, json!({"c": [1]}));
    Ok(())
}

#[test]
fn test_nested_failure_rolls_back_everything() -> Result<(), Box<dyn Error>> {
    let v = validator(json!({
        "properties": {
            "list": {
                "items": {
                    "properties": {
                        "name": {"default": "anon"},
                        "age": {"type": "integer"}
                    }
                }
            },
            "meta": {"default": {}}
        }
    }))?;
    let before = json!({"list": [{}, {"age": "old"}, {"age": 3}]});
    let mut data = before.clone();
    assert!(!check(&v, "0", &mut data)?);
    assert_eq!(data, before);

    let mut data = json!({"list": [{}, {"age": 3}]});
    assert!(check(&v, "0", &mut data)?);
    assert_eq!(
        data,
        json!({"list": [{"name": "anon"}, {"age": 3, "name": "anon"}], "meta": {}})
    );
    Ok(())
}

#[test]
fn test_defaults_disabled() -> Result<(), Box<dyn Error>> {
    let mut compiler = Compiler::new();
    compiler.add_schema(json!({
        "properties": {"a": {"default": 1}},
        "items": [{"default": 2}]
    }));
    let v = compiler.compile()?;

    let mut data = json!({});
    assert!(check(&v, "0", &mut data)?);
    assert_eq!(data, json!({}));

    let mut data = json!([]);
    assert!(check(&v, "0", &mut data)?);
    assert_eq!(data, json!([]));
    Ok(())
}
