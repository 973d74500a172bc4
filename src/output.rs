use std::{
    cmp::Reverse,
    fmt::{self, Display, Formatter},
    str::FromStr,
    sync::Arc,
};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::{undo::Undo, util::quote};

/// Outcome of validating one instance against one schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    /// number of keyword checks that succeeded; a relevance score only.
    pub passed: usize,
    /// set on the passing-branch summaries of `ONE_OF_MULTIPLE`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Arc<Value>>,
    #[serde(skip)]
    pub(crate) undo: Undo,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            valid: true,
            errors: vec![],
            passed: 0,
            schema: None,
            undo: Undo::default(),
        }
    }
}

/// One keyword failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub code: ErrorCode,
    /// json-pointer to the failing value in the instance.
    pub path: String,
    pub instance: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// keyword that failed.
    pub validator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator_value: Option<Value>,
    /// schema node holding the keyword.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Arc<Value>>,
    pub relative_schema_path: String,
    pub absolute_schema_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// branch reports of combinator keywords.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<Report>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidType,
    InvalidFormat,
    EnumMismatch,
    AllOfFailed,
    AnyOfMissing,
    OneOfMissing,
    OneOfMultiple,
    NotPassed,
    ArrayLengthShort,
    ArrayLengthLong,
    ArrayUnique,
    ArrayAdditionalItems,
    MultipleOf,
    Minimum,
    MinimumExclusive,
    Maximum,
    MaximumExclusive,
    ObjectPropertiesMinimum,
    ObjectPropertiesMaximum,
    ObjectMissingRequiredProperty,
    ObjectAdditionalProperties,
    ObjectDependencyKey,
    MinLength,
    MaxLength,
    Pattern,
    /// reported by a custom keyword.
    Custom(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        use ErrorCode::*;
        match self {
            InvalidType => "INVALID_TYPE",
            InvalidFormat => "INVALID_FORMAT",
            EnumMismatch => "ENUM_MISMATCH",
            AllOfFailed => "ALL_OF_FAILED",
            AnyOfMissing => "ANY_OF_MISSING",
            OneOfMissing => "ONE_OF_MISSING",
            OneOfMultiple => "ONE_OF_MULTIPLE",
            NotPassed => "NOT_PASSED",
            ArrayLengthShort => "ARRAY_LENGTH_SHORT",
            ArrayLengthLong => "ARRAY_LENGTH_LONG",
            ArrayUnique => "ARRAY_UNIQUE",
            ArrayAdditionalItems => "ARRAY_ADDITIONAL_ITEMS",
            MultipleOf => "MULTIPLE_OF",
            Minimum => "MINIMUM",
            MinimumExclusive => "MINIMUM_EXCLUSIVE",
            Maximum => "MAXIMUM",
            MaximumExclusive => "MAXIMUM_EXCLUSIVE",
            ObjectPropertiesMinimum => "OBJECT_PROPERTIES_MINIMUM",
            ObjectPropertiesMaximum => "OBJECT_PROPERTIES_MAXIMUM",
            ObjectMissingRequiredProperty => "OBJECT_MISSING_REQUIRED_PROPERTY",
            ObjectAdditionalProperties => "OBJECT_ADDITIONAL_PROPERTIES",
            ObjectDependencyKey => "OBJECT_DEPENDENCY_KEY",
            MinLength => "MIN_LENGTH",
            MaxLength => "MAX_LENGTH",
            Pattern => "PATTERN",
            Custom(code) => code,
        }
    }

    /// failures of `anyOf`/`oneOf` where some branch may have been
    /// intended; best match looks through them into their branches.
    pub fn is_weak(&self) -> bool {
        matches!(self, Self::AnyOfMissing | Self::OneOfMissing)
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Post-processing applied to failing reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// raw report, errors in evaluation order.
    #[default]
    None,
    /// every branch kept, most relevant first.
    Relevance,
    /// only the most relevant branch of each `anyOf`/`oneOf` kept.
    BestMatch,
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "relevance" => Ok(Self::Relevance),
            "best_match" => Ok(Self::BestMatch),
            _ => Err(format!("unknown algorithm {}", quote(s))),
        }
    }
}

impl Report {
    pub(crate) fn add_error(&mut self, e: ValidationError) {
        self.valid = false;
        self.errors.push(e);
    }

    /// folds a nested report into this one. only valid reports contribute
    /// their passed checks.
    pub(crate) fn merge(&mut self, child: Report) {
        if child.valid {
            self.passed += child.passed;
        } else {
            self.valid = false;
            self.errors.extend(child.errors);
        }
        self.undo.append(child.undo);
    }

    pub(crate) fn apply(self, algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::None => self,
            Algorithm::Relevance => self.relevance(),
            Algorithm::BestMatch => self.best_match(),
        }
    }

    /// Reduces every failing `anyOf`/`oneOf` to its closest branch: the one
    /// with most passed checks, then fewest errors, then the earliest.
    /// Weak errors are dropped wherever a hard error sits beside them.
    /// Errors come out most recent first.
    pub fn best_match(mut self) -> Self {
        if self.valid {
            return self;
        }
        if self.errors.iter().any(|e| !e.code.is_weak()) {
            self.errors.retain(|e| !e.code.is_weak());
        }
        for e in &mut self.errors {
            let context = std::mem::take(&mut e.context);
            e.context = if e.code.is_weak() {
                let best = context
                    .into_iter()
                    .enumerate()
                    .min_by_key(|(i, r)| (Reverse(r.passed), r.errors.len(), *i))
                    .map(|(_, r)| r);
                best.into_iter().map(Report::best_match).collect()
            } else {
                context.into_iter().map(Report::best_match).collect()
            };
        }
        self.errors.reverse();
        self
    }

    /// Orders like [`Report::best_match`] without discarding anything:
    /// contexts are sorted closest branch first and weak errors follow
    /// hard ones.
    pub fn relevance(mut self) -> Self {
        if self.valid {
            return self;
        }
        for e in &mut self.errors {
            let mut context: Vec<Report> = std::mem::take(&mut e.context)
                .into_iter()
                .map(Report::relevance)
                .collect();
            if e.code.is_weak() {
                context.sort_by_key(|r| (Reverse(r.passed), r.errors.len()));
            }
            e.context = context;
        }
        self.errors.reverse();
        self.errors.sort_by_key(|e| e.code.is_weak());
        self
    }

    /// all errors including those nested in contexts, depth first.
    pub fn iter_errors(&self) -> impl Iterator<Item = &ValidationError> {
        let mut stack: Vec<&ValidationError> = self.errors.iter().rev().collect();
        std::iter::from_fn(move || {
            let e = stack.pop()?;
            for r in e.context.iter().rev() {
                stack.extend(r.errors.iter().rev());
            }
            Some(e)
        })
    }
}

impl Display for ValidationError {
    /// Use `#` to show the schema location.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "at {}", quote(&self.path))?;
        if f.alternate() {
            write!(f, " [{}]", self.absolute_schema_path)?;
        }
        match &self.message {
            Some(msg) => write!(f, ": [{}] {msg}", self.code),
            None => write!(f, ": [{}]", self.code),
        }
    }
}

impl Display for Report {
    /// Formats the error hierarchy. Use `#` to show schema locations.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.valid {
            return write!(f, "valid ({} checks passed)", self.passed);
        }
        write!(f, "invalid ({} checks passed)", self.passed)?;
        let mut indent = Indent::default();
        self.write_errors(f, &mut indent)
    }
}

impl Report {
    fn write_errors(&self, f: &mut Formatter<'_>, indent: &mut Indent) -> fmt::Result {
        indent.pre();
        for e in &self.errors {
            indent.line(f)?;
            if f.alternate() {
                write!(f, "{e:#}")?;
            } else {
                write!(f, "{e}")?;
            }
            for (i, r) in e.context.iter().enumerate() {
                indent.pre();
                indent.line(f)?;
                write!(f, "branch {i}: {}", if r.valid { "valid" } else { "invalid" })?;
                r.write_errors(f, indent)?;
                indent.post();
            }
        }
        indent.post();
        Ok(())
    }
}

// Indent --

#[derive(Default)]
struct Indent {
    n: usize,
}

impl Indent {
    fn pre(&mut self) {
        self.n += 1;
    }

    fn line(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f)?;
        for _ in 0..self.n - 1 {
            write!(f, "  ")?;
        }
        write!(f, "- ")
    }

    fn post(&mut self) {
        self.n -= 1;
    }
}
