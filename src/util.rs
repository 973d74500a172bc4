use std::{fmt::Display, str::Utf8Error};

use percent_encoding::percent_decode_str;
use serde_json::{Number, Value};

/// returns single-quoted string
pub(crate) fn quote<T>(s: &T) -> String
where
    T: AsRef<str> + std::fmt::Debug + ?Sized,
{
    let s = format!("{s:?}")
        .replace(r#"\""#, "\"")
        .replace('\'', r#"\'"#);
    format!("'{}'", &s[1..s.len() - 1])
}

pub(crate) fn join_iter<T>(iterable: T, sep: &str) -> String
where
    T: IntoIterator,
    T::Item: Display,
{
    iterable
        .into_iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

/// escapes a single json-pointer token.
pub(crate) fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

pub(crate) fn path_unescape(s: &str) -> Result<String, Utf8Error> {
    Ok(percent_decode_str(s).decode_utf8()?.into_owned())
}

pub(crate) fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// splits `$ref` value into schema id and fragment.
pub(crate) fn split(url: &str) -> (&str, &str) {
    if let Some(i) = url.find('#') {
        (&url[..i], &url[i + 1..])
    } else {
        (url, "")
    }
}

pub(crate) fn ptr_tokens(ptr: &str) -> impl Iterator<Item = String> + '_ {
    ptr.split('/').skip(1).map(unescape)
}

/// serde_json treats 0 and 0.0 not equal. so we cannot simply use v1==v2
pub(crate) fn equals(v1: &Value, v2: &Value) -> bool {
    match (v1, v2) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(b1), Value::Bool(b2)) => b1 == b2,
        (Value::Number(n1), Value::Number(n2)) => {
            if let (Some(n1), Some(n2)) = (n1.as_u64(), n2.as_u64()) {
                return n1 == n2;
            }
            if let (Some(n1), Some(n2)) = (n1.as_i64(), n2.as_i64()) {
                return n1 == n2;
            }
            if let (Some(n1), Some(n2)) = (n1.as_f64(), n2.as_f64()) {
                return n1 == n2;
            }
            false
        }
        (Value::String(s1), Value::String(s2)) => s1 == s2,
        (Value::Array(arr1), Value::Array(arr2)) => {
            if arr1.len() != arr2.len() {
                return false;
            }
            arr1.iter().zip(arr2).all(|(e1, e2)| equals(e1, e2))
        }
        (Value::Object(obj1), Value::Object(obj2)) => {
            if obj1.len() != obj2.len() {
                return false;
            }
            for (k1, v1) in obj1 {
                if let Some(v2) = obj2.get(k1) {
                    if !equals(v1, v2) {
                        return false;
                    }
                } else {
                    return false;
                }
            }
            true
        }
        _ => false,
    }
}

/// a number with zero fraction is an integer, `1.0` included.
pub(crate) fn is_integer(n: &Number) -> bool {
    n.is_u64() || n.is_i64() || n.as_f64().map_or(false, |f| f.is_finite() && f.fract() == 0.0)
}

pub(crate) fn format_number(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if !n.is_u64() && !n.is_i64() && f.fract() == 0.0 && f.abs() < 1e15 => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    }
}

/// renders a value the way error messages show it:
/// `[ 1, "a" ]`, `{ "k": true }`, `[]`, `{}`.
pub(crate) fn inspect(v: &Value) -> String {
    match v {
        Value::Number(n) => format_number(n),
        Value::Array(arr) if arr.is_empty() => "[]".to_owned(),
        Value::Array(arr) => format!("[ {} ]", join_iter(arr.iter().map(inspect), ", ")),
        Value::Object(obj) if obj.is_empty() => "{}".to_owned(),
        Value::Object(obj) => {
            let entries = obj
                .iter()
                .map(|(k, v)| format!("{}: {}", Value::String(k.clone()), inspect(v)));
            format!("{{ {} }}", join_iter(entries, ", "))
        }
        _ => v.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote(r#"abc"def'ghi"#), r#"'abc"def\'ghi'"#);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a~1b~0c"), "a/b~c");
        assert_eq!(unescape("~01"), "~1");
        assert_eq!(escape("a/b~c"), "a~1b~0c");
    }

    #[test]
    fn test_path_unescape() {
        assert_eq!(path_unescape("/definitions/a%20b").unwrap(), "/definitions/a b");
        assert_eq!(path_unescape("/definitions/a~1b").unwrap(), "/definitions/a~1b");
        assert_eq!(
            ptr_tokens("/definitions/a~1b").collect::<Vec<_>>(),
            vec!["definitions", "a/b"]
        );
    }

    #[test]
    fn test_split() {
        assert_eq!(split("#/a"), ("", "/a"));
        assert_eq!(split("types#/definitions/uuid"), ("types", "/definitions/uuid"));
        assert_eq!(split("point"), ("point", ""));
    }

    #[test]
    fn test_equals() {
        let tests = [["1.0", "1"], ["-1.0", "-1"], [r#"{"a":1,"b":2}"#, r#"{"b":2,"a":1.0}"#]];
        for [a, b] in tests {
            let a = serde_json::from_str(a).unwrap();
            let b = serde_json::from_str(b).unwrap();
            assert!(equals(&a, &b));
        }
        assert!(!equals(&json!([1, 2]), &json!([2, 1])));
        assert!(!equals(&json!({"a": 1}), &json!({"a": 1, "b": 1})));
    }

    #[test]
    fn test_is_integer() {
        assert!(is_integer(&Number::from(3)));
        assert!(is_integer(&Number::from_f64(1.0).unwrap()));
        assert!(!is_integer(&Number::from_f64(1.5).unwrap()));
    }

    #[test]
    fn test_inspect() {
        assert_eq!(inspect(&json!(["string", 1, {}])), r#"[ "string", 1, {} ]"#);
        assert_eq!(inspect(&json!([{"foo": "bar"}])), r#"[ { "foo": "bar" } ]"#);
        assert_eq!(inspect(&json!([])), "[]");
        assert_eq!(inspect(&json!("foo")), r#""foo""#);
        assert_eq!(inspect(&json!(5.0)), "5");
        assert_eq!(inspect(&json!(1.5)), "1.5");
    }
}
