use std::{fmt, sync::Arc};

use ahash::AHashMap;
use serde_json::Value;

use crate::{
    compiler::CompileError,
    formats::FORMATS,
    planner::{KeywordMeta, KEYWORDS},
};

/// A keyword check supplied by the application.
///
/// `value` is the keyword's value in the schema. `parent` is the object or
/// array the instance was read from, `None` at the top level. Its entry
/// for the instance holds the value as it was read, before transformers
/// ran on it. `root` is the document as it was submitted for validation.
pub trait Keyword: Send + Sync {
    fn validate(
        &self,
        value: &Value,
        instance: &Value,
        parent: Option<&Value>,
        root: Option<&Value>,
    ) -> Result<(), Violation>;
}

impl<F> Keyword for F
where
    F: Fn(&Value, &Value, Option<&Value>, Option<&Value>) -> Result<(), Violation> + Send + Sync,
{
    fn validate(
        &self,
        value: &Value,
        instance: &Value,
        parent: Option<&Value>,
        root: Option<&Value>,
    ) -> Result<(), Violation> {
        self(value, instance, parent, root)
    }
}

/// Failure reported by a custom [`Keyword`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub code: String,
    pub message: String,
}

impl Violation {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// When a transformer rewrites the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// before any keyword of the schema is checked.
    Pre,
    /// after the schema validated the instance successfully.
    Post,
}

pub type FormatFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Receives the instance and the keyword's value, returns the replacement.
pub type TransformFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Format {
    pub(crate) name: Arc<str>,
    pub(crate) func: FormatFn,
}

impl fmt::Debug for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Format({})", self.name)
    }
}

#[derive(Clone)]
pub(crate) struct CustomKeyword {
    pub(crate) meta: KeywordMeta,
    pub(crate) imp: Arc<dyn Keyword>,
}

#[derive(Clone)]
pub(crate) struct Transformer {
    pub(crate) phase: Phase,
    pub(crate) func: TransformFn,
}

/// Name tables consulted while compiling. Nothing here is looked up at
/// validation time.
#[derive(Clone)]
pub(crate) struct Extensions {
    formats: AHashMap<String, Format>,
    keywords: AHashMap<String, CustomKeyword>,
    transformers: AHashMap<String, Transformer>,
}

impl Default for Extensions {
    fn default() -> Self {
        let mut formats = AHashMap::new();
        for (&name, &check) in FORMATS.iter() {
            let func: FormatFn = Arc::new(move |s: &str| check(s).is_ok());
            formats.insert(name.to_owned(), Format { name: name.into(), func });
        }
        Self {
            formats,
            keywords: AHashMap::new(),
            transformers: AHashMap::new(),
        }
    }
}

impl Extensions {
    pub(crate) fn register_format(&mut self, name: &str, func: FormatFn) -> Result<(), CompileError> {
        if self.formats.contains_key(name) {
            return Err(duplicate("format", name));
        }
        let format = Format {
            name: name.into(),
            func,
        };
        self.formats.insert(name.to_owned(), format);
        Ok(())
    }

    pub(crate) fn register_keyword(
        &mut self,
        name: &str,
        meta: KeywordMeta,
        imp: Arc<dyn Keyword>,
    ) -> Result<(), CompileError> {
        if self.is_taken(name) {
            return Err(duplicate("keyword", name));
        }
        self.keywords.insert(name.to_owned(), CustomKeyword { meta, imp });
        Ok(())
    }

    pub(crate) fn register_transformer(
        &mut self,
        name: &str,
        phase: Phase,
        func: TransformFn,
    ) -> Result<(), CompileError> {
        if self.is_taken(name) {
            return Err(duplicate("transformer", name));
        }
        self.transformers.insert(name.to_owned(), Transformer { phase, func });
        Ok(())
    }

    fn is_taken(&self, name: &str) -> bool {
        KEYWORDS.contains_key(name)
            || self.keywords.contains_key(name)
            || self.transformers.contains_key(name)
    }

    pub(crate) fn format(&self, name: &str) -> Option<&Format> {
        self.formats.get(name)
    }

    pub(crate) fn keyword(&self, name: &str) -> Option<&CustomKeyword> {
        self.keywords.get(name)
    }

    pub(crate) fn transformer(&self, name: &str) -> Option<&Transformer> {
        self.transformers.get(name)
    }
}

fn duplicate(kind: &'static str, name: &str) -> CompileError {
    CompileError::DuplicateRegistration {
        kind,
        name: name.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::planner::Applies;

    fn noop(_: &Value, _: &Value, _: Option<&Value>, _: Option<&Value>) -> Result<(), Violation> {
        Ok(())
    }

    #[test]
    fn test_builtin_formats() {
        let ext = Extensions::default();
        let date = ext.format("date").unwrap();
        assert!((date.func)("2023-01-31"));
        assert!(!(date.func)("2023-01-32"));
        assert!(ext.format("uuid").is_none());
    }

    #[test]
    fn test_duplicate_format() {
        let mut ext = Extensions::default();
        let func: FormatFn = Arc::new(|s: &str| s.len() == 36);
        ext.register_format("uuid", func.clone()).unwrap();
        assert!(matches!(
            ext.register_format("uuid", func.clone()),
            Err(CompileError::DuplicateRegistration { kind: "format", .. })
        ));
        assert!(ext.register_format("date", func).is_err());
    }

    #[test]
    fn test_duplicate_keyword() {
        let mut ext = Extensions::default();
        let meta = KeywordMeta::new(66, Applies::String);
        ext.register_keyword("matches", meta, Arc::new(noop)).unwrap();
        assert!(ext.register_keyword("matches", meta, Arc::new(noop)).is_err());
        assert!(ext.register_keyword("minLength", meta, Arc::new(noop)).is_err());

        let trim: TransformFn = Arc::new(|v: &Value, _: &Value| v.clone());
        assert!(ext.register_transformer("matches", Phase::Pre, trim.clone()).is_err());
        ext.register_transformer("trim", Phase::Pre, trim).unwrap();
        let out = (ext.transformer("trim").unwrap().func)(&json!("a"), &json!(true));
        assert_eq!(out, json!("a"));
    }
}
