use std::ops::Range;

use ahash::AHashMap;
use once_cell::sync::Lazy;
use serde_json::{Map, Value};

use crate::extensions::Extensions;

/// JSON type a keyword applies to. Keywords of `Any` run unguarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Applies {
    Any,
    Number,
    String,
    Array,
    Object,
}

/// Rank and applicable type of a keyword. Lower ranks are checked first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordMeta {
    pub rank: i32,
    pub applies: Applies,
}

impl KeywordMeta {
    pub const fn new(rank: i32, applies: Applies) -> Self {
        Self { rank, applies }
    }
}

/// keywords with negative rank carry no check of their own.
pub(crate) static KEYWORDS: Lazy<AHashMap<&'static str, KeywordMeta>> = Lazy::new(|| {
    use Applies::*;
    AHashMap::from_iter(
        [
            ("$schema", -1, Any),
            ("$ref", -1, Any),
            ("id", -1, Any),
            ("title", -1, Any),
            ("description", -1, Any),
            ("default", -1, Any),
            ("definitions", -1, Any),
            ("type", 0, Any),
            // number
            ("multipleOf", 10, Number),
            ("minimum", 20, Number),
            ("exclusiveMinimum", 25, Number),
            ("maximum", 30, Number),
            ("exclusiveMaximum", 35, Number),
            // string
            ("minLength", 40, String),
            ("maxLength", 50, String),
            ("pattern", 60, String),
            ("format", 65, String),
            // array
            ("additionalItems", 70, Array),
            ("items", 75, Array),
            ("minItems", 80, Array),
            ("maxItems", 90, Array),
            ("uniqueItems", 100, Array),
            // object
            ("required", 110, Object),
            ("additionalProperties", 120, Object),
            ("patternProperties", 130, Object),
            ("properties", 140, Object),
            ("minProperties", 150, Object),
            ("maxProperties", 160, Object),
            ("dependencies", 170, Object),
            // combinators
            ("allOf", 180, Any),
            ("anyOf", 190, Any),
            ("oneOf", 200, Any),
            ("not", 210, Any),
            ("enum", 220, Any),
        ]
        .map(|(kw, rank, applies)| (kw, KeywordMeta::new(rank, applies))),
    )
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Planned<'s> {
    pub(crate) keyword: &'s str,
    pub(crate) meta: KeywordMeta,
    pub(crate) custom: bool,
}

/// A type-guarded run of keywords, as a range into [`Plan::keywords`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Region {
    pub(crate) applies: Applies,
    pub(crate) keywords: Range<usize>,
}

/// Checking keywords of one schema node, in ascending rank.
#[derive(Debug, Default)]
pub(crate) struct Plan<'s> {
    pub(crate) keywords: Vec<Planned<'s>>,
    /// keywords the planner does not know, in document order.
    pub(crate) unknown: Vec<&'s str>,
}

impl<'s> Plan<'s> {
    pub(crate) fn new(obj: &'s Map<String, Value>, ext: &Extensions) -> Self {
        let mut plan = Plan::default();
        for kw in obj.keys() {
            if let Some(&meta) = KEYWORDS.get(kw.as_str()) {
                if meta.rank >= 0 {
                    plan.keywords.push(Planned {
                        keyword: kw,
                        meta,
                        custom: false,
                    });
                }
            } else if let Some(custom) = ext.keyword(kw) {
                plan.keywords.push(Planned {
                    keyword: kw,
                    meta: custom.meta,
                    custom: true,
                });
            } else if ext.transformer(kw).is_none() {
                plan.unknown.push(kw);
            }
        }
        // stable, so equal ranks keep document order
        plan.keywords.sort_by_key(|p| p.meta.rank);
        plan
    }

    /// Splits keywords into maximal runs sharing one type guard. Each type
    /// gets a single region unless a foreign keyword ranks inside its span.
    pub(crate) fn regions(&self) -> Vec<Region> {
        let mut regions: Vec<Region> = vec![];
        for (i, p) in self.keywords.iter().enumerate() {
            match regions.last_mut() {
                Some(r) if r.applies == p.meta.applies => r.keywords.end = i + 1,
                _ => regions.push(Region {
                    applies: p.meta.applies,
                    keywords: i..i + 1,
                }),
            }
        }
        regions
    }

    pub(crate) fn keywords_in(&self, region: &Region) -> &[Planned<'s>] {
        &self.keywords[region.keywords.clone()]
    }
}
