//! Datalist - Schema-driven filter and sort engine for list data sources
//!
//! A list data source declares the schema of its records, which keys may be
//! filtered or sorted on, and the attribute the results land in. The engine
//! turns that into a data-source schema with repeatable `filter` and `sort`
//! blocks, validates user queries against it, and applies them to the records
//! fetched upstream.
//!
//! Records are flattened before filtering, so every key is looked up in the
//! same attribute map the user finally sees.

use std::cmp::Ordering;

use regex::Regex;
use uuid::Uuid;

use crate::provider::{ProviderError, ProviderResult};
use crate::resource::{Attributes, Resource, State, Value};
use crate::schema::{AttributeSchema, AttributeType, BlockSchema, ResourceSchema};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataListError {
    #[error("{key} is not an attribute of {resource_type} records")]
    KeyNotInSchema {
        resource_type: String,
        key: String,
    },

    #[error("{key} cannot be used to sort: only scalar attributes are sortable")]
    UnsortableKey { key: String },

    #[error("unknown filter key '{key}', expected one of: {}", allowed.join(", "))]
    UnknownFilterKey { key: String, allowed: Vec<String> },

    #[error("unknown sort key '{key}', expected one of: {}", allowed.join(", "))]
    UnknownSortKey { key: String, allowed: Vec<String> },

    #[error("unknown match_by '{0}', expected exact, substring or re")]
    UnknownMatchBy(String),

    #[error("match_by {match_by} is only supported on string attributes, '{key}' is not a string")]
    MatchByRequiresString { key: String, match_by: String },

    #[error("filter value '{value}' for '{key}' is not a valid {expected}")]
    InvalidFilterValue {
        key: String,
        value: String,
        expected: String,
    },

    #[error("invalid regular expression '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("malformed {block} block: {message}")]
    MalformedBlock { block: String, message: String },
}

impl From<DataListError> for ProviderError {
    fn from(e: DataListError) -> Self {
        ProviderError::invalid(e.to_string())
    }
}

/// How filter values are compared with record values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchBy {
    #[default]
    Exact,
    Substring,
    Regex,
}

impl MatchBy {
    pub fn parse(s: &str) -> Result<Self, DataListError> {
        match s {
            "exact" => Ok(MatchBy::Exact),
            "substring" => Ok(MatchBy::Substring),
            "re" | "regex" => Ok(MatchBy::Regex),
            other => Err(DataListError::UnknownMatchBy(other.to_string())),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            MatchBy::Exact => "exact",
            MatchBy::Substring => "substring",
            MatchBy::Regex => "re",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// Anything other than `desc` sorts ascending
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("desc") {
            Direction::Desc
        } else {
            Direction::Asc
        }
    }
}

/// One `filter` block as written by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub key: String,
    pub values: Vec<String>,
    pub match_by: MatchBy,
    pub all: bool,
}

impl Filter {
    pub fn exact(key: impl Into<String>, values: &[&str]) -> Self {
        Self {
            key: key.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
            match_by: MatchBy::Exact,
            all: false,
        }
    }
}

/// One `sort` block as written by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub key: String,
    pub direction: Direction,
}

impl Sort {
    pub fn new(key: impl Into<String>, direction: Direction) -> Self {
        Self {
            key: key.into(),
            direction,
        }
    }
}

/// Filters, sorts and extra query fields of one data-source evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub sorts: Vec<Sort>,
    pub extra: Attributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarKind {
    String,
    Int,
    Float,
    Bool,
}

impl ScalarKind {
    fn of(attr_type: &AttributeType) -> Option<Self> {
        match attr_type.base() {
            AttributeType::String | AttributeType::Enum(_) => Some(ScalarKind::String),
            AttributeType::Int => Some(ScalarKind::Int),
            AttributeType::Float => Some(ScalarKind::Float),
            AttributeType::Bool => Some(ScalarKind::Bool),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Int => "integer",
            ScalarKind::Float => "number",
            ScalarKind::Bool => "boolean",
        }
    }
}

/// Scalar kind of an attribute and whether it holds a collection of them
fn element_kind(attr_type: &AttributeType) -> Option<(ScalarKind, bool)> {
    match attr_type.base() {
        AttributeType::List(inner) | AttributeType::Set(inner) => {
            ScalarKind::of(inner).map(|k| (k, true))
        }
        other => ScalarKind::of(other).map(|k| (k, false)),
    }
}

/// Declaration of a list data source
#[derive(Debug, Clone)]
pub struct DataListConfig {
    pub resource_type: String,
    pub record_schema: BlockSchema,
    pub filter_keys: Vec<String>,
    pub sort_keys: Vec<String>,
    pub result_attribute: String,
    pub extra_query: Vec<AttributeSchema>,
    pub description: Option<String>,
}

impl DataListConfig {
    pub fn new(
        resource_type: impl Into<String>,
        result_attribute: impl Into<String>,
        record_schema: BlockSchema,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            record_schema,
            filter_keys: Vec::new(),
            sort_keys: Vec::new(),
            result_attribute: result_attribute.into(),
            extra_query: Vec::new(),
            description: None,
        }
    }

    pub fn filter_keys(mut self, keys: &[&str]) -> Self {
        self.filter_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn sort_keys(mut self, keys: &[&str]) -> Self {
        self.sort_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn extra_query(mut self, schema: AttributeSchema) -> Self {
        self.extra_query.push(schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Check that every filter and sort key names a usable record attribute
    pub fn validate(&self) -> Result<(), DataListError> {
        for key in &self.filter_keys {
            let attr = self.record_attribute(key)?;
            if element_kind(&attr.attr_type).is_none() {
                return Err(DataListError::KeyNotInSchema {
                    resource_type: self.resource_type.clone(),
                    key: key.clone(),
                });
            }
        }
        for key in &self.sort_keys {
            let attr = self.record_attribute(key)?;
            if !attr.attr_type.is_scalar() {
                return Err(DataListError::UnsortableKey { key: key.clone() });
            }
        }
        Ok(())
    }

    fn record_attribute(&self, key: &str) -> Result<&AttributeSchema, DataListError> {
        self.record_schema
            .attributes
            .get(key)
            .ok_or_else(|| DataListError::KeyNotInSchema {
                resource_type: self.resource_type.clone(),
                key: key.to_string(),
            })
    }

    /// Data-source schema: filter and sort blocks, extra query fields, and the result list
    pub fn schema(&self) -> ResourceSchema {
        let mut schema = ResourceSchema::new(self.resource_type.clone());
        if let Some(desc) = &self.description {
            schema = schema.with_description(desc.clone());
        }

        if !self.filter_keys.is_empty() {
            let filter = BlockSchema::new()
                .attribute(
                    AttributeSchema::new("key", AttributeType::Enum(self.filter_keys.clone()))
                        .required(),
                )
                .attribute(
                    AttributeSchema::new(
                        "values",
                        AttributeType::list_of(AttributeType::String),
                    )
                    .required(),
                )
                .attribute(
                    AttributeSchema::new(
                        "match_by",
                        AttributeType::Enum(vec![
                            "exact".to_string(),
                            "substring".to_string(),
                            "re".to_string(),
                        ]),
                    )
                    .with_default("exact"),
                )
                .attribute(AttributeSchema::new("all", AttributeType::Bool).with_default(false));
            schema = schema.attribute(AttributeSchema::new(
                "filter",
                AttributeType::list_of(AttributeType::block(filter)),
            ));
        }

        if !self.sort_keys.is_empty() {
            let sort = BlockSchema::new()
                .attribute(
                    AttributeSchema::new("key", AttributeType::Enum(self.sort_keys.clone()))
                        .required(),
                )
                .attribute(
                    AttributeSchema::new("direction", AttributeType::String).with_default("asc"),
                );
            schema = schema.attribute(AttributeSchema::new(
                "sort",
                AttributeType::list_of(AttributeType::block(sort)),
            ));
        }

        for extra in &self.extra_query {
            schema = schema.attribute(extra.clone());
        }

        schema.attribute(
            AttributeSchema::new(
                self.result_attribute.clone(),
                AttributeType::list_of(AttributeType::block(self.record_schema.clone())),
            )
            .computed_only(),
        )
    }

    /// Extract filters, sorts and extra fields from a data source's attributes
    pub fn parse_query(&self, attributes: &Attributes) -> Result<Query, DataListError> {
        let mut query = Query::default();

        for block in blocks(attributes, "filter")? {
            let key = block_string(block, "filter", "key")?;
            if !self.filter_keys.iter().any(|k| k == &key) {
                return Err(DataListError::UnknownFilterKey {
                    key,
                    allowed: self.filter_keys.clone(),
                });
            }
            let values = match block.get("values") {
                Some(v) => v.string_elements(),
                None => Vec::new(),
            };
            if values.is_empty() {
                return Err(DataListError::MalformedBlock {
                    block: "filter".to_string(),
                    message: format!("'{}' needs at least one value", key),
                });
            }
            let match_by = match block.get("match_by").and_then(Value::as_str) {
                Some(s) => MatchBy::parse(s)?,
                None => MatchBy::Exact,
            };
            let all = block.get("all").and_then(Value::as_bool).unwrap_or(false);
            query.filters.push(Filter {
                key,
                values,
                match_by,
                all,
            });
        }

        for block in blocks(attributes, "sort")? {
            let key = block_string(block, "sort", "key")?;
            if !self.sort_keys.iter().any(|k| k == &key) {
                return Err(DataListError::UnknownSortKey {
                    key,
                    allowed: self.sort_keys.clone(),
                });
            }
            let direction = block
                .get("direction")
                .and_then(Value::as_str)
                .map(Direction::parse)
                .unwrap_or_default();
            query.sorts.push(Sort { key, direction });
        }

        for extra in &self.extra_query {
            if let Some(value) = attributes.get(&extra.name) {
                query.extra.insert(extra.name.clone(), value.clone());
            }
        }

        Ok(query)
    }

    /// Filter then sort flattened records
    pub fn apply(
        &self,
        query: &Query,
        mut records: Vec<Attributes>,
    ) -> Result<Vec<Attributes>, DataListError> {
        for filter in &query.filters {
            let matcher = self.compile(filter)?;
            records.retain(|record| matcher.accepts(record.get(&filter.key)));
        }
        if !query.sorts.is_empty() {
            records.sort_by(|a, b| compare_records(a, b, &query.sorts));
        }
        Ok(records)
    }

    /// Evaluate a data-source resource over already flattened records
    pub fn read(&self, resource: &Resource, records: Vec<Attributes>) -> ProviderResult<State> {
        let query = self.parse_query(&resource.attributes)?;
        let results = self.apply(&query, records)?;

        let mut attributes = resource.attributes.clone();
        attributes.insert(
            self.result_attribute.clone(),
            Value::List(results.into_iter().map(Value::Map).collect()),
        );
        Ok(State::existing(resource.id.clone(), attributes)
            .with_identifier(Uuid::new_v4().to_string()))
    }

    fn compile(&self, filter: &Filter) -> Result<Matcher, DataListError> {
        let attr = self.record_attribute(&filter.key)?;
        let (kind, _) = element_kind(&attr.attr_type).ok_or_else(|| {
            DataListError::KeyNotInSchema {
                resource_type: self.resource_type.clone(),
                key: filter.key.clone(),
            }
        })?;

        if filter.match_by != MatchBy::Exact && kind != ScalarKind::String {
            return Err(DataListError::MatchByRequiresString {
                key: filter.key.clone(),
                match_by: filter.match_by.as_str().to_string(),
            });
        }

        let patterns = match filter.match_by {
            MatchBy::Exact => Patterns::Exact(
                filter
                    .values
                    .iter()
                    .map(|v| parse_scalar(&filter.key, v, kind))
                    .collect::<Result<_, _>>()?,
            ),
            MatchBy::Substring => Patterns::Substring(filter.values.clone()),
            MatchBy::Regex => Patterns::Regex(
                filter
                    .values
                    .iter()
                    .map(|v| {
                        Regex::new(v).map_err(|e| DataListError::InvalidRegex {
                            pattern: v.clone(),
                            message: e.to_string(),
                        })
                    })
                    .collect::<Result<_, _>>()?,
            ),
        };

        Ok(Matcher {
            patterns,
            all: filter.all,
        })
    }
}

fn blocks<'a>(attributes: &'a Attributes, name: &str) -> Result<Vec<&'a Attributes>, DataListError> {
    let Some(value) = attributes.get(name) else {
        return Ok(Vec::new());
    };
    let malformed = || DataListError::MalformedBlock {
        block: name.to_string(),
        message: "expected a list of blocks".to_string(),
    };
    match value {
        Value::Map(map) => Ok(vec![map]),
        other => other
            .elements()
            .ok_or_else(malformed)?
            .into_iter()
            .map(|v| v.as_map().ok_or_else(malformed))
            .collect(),
    }
}

fn block_string(block: &Attributes, name: &str, key: &str) -> Result<String, DataListError> {
    block
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DataListError::MalformedBlock {
            block: name.to_string(),
            message: format!("'{}' is required", key),
        })
}

fn parse_scalar(key: &str, raw: &str, kind: ScalarKind) -> Result<Value, DataListError> {
    let invalid = || DataListError::InvalidFilterValue {
        key: key.to_string(),
        value: raw.to_string(),
        expected: kind.name().to_string(),
    };
    match kind {
        ScalarKind::String => Ok(Value::String(raw.to_string())),
        ScalarKind::Int => raw.trim().parse::<i64>().map(Value::Int).map_err(|_| invalid()),
        ScalarKind::Float => raw
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| invalid()),
        ScalarKind::Bool => raw.trim().parse::<bool>().map(Value::Bool).map_err(|_| invalid()),
    }
}

#[derive(Debug)]
enum Patterns {
    Exact(Vec<Value>),
    Substring(Vec<String>),
    Regex(Vec<Regex>),
}

#[derive(Debug)]
struct Matcher {
    patterns: Patterns,
    all: bool,
}

impl Matcher {
    fn len(&self) -> usize {
        match &self.patterns {
            Patterns::Exact(v) => v.len(),
            Patterns::Substring(v) => v.len(),
            Patterns::Regex(v) => v.len(),
        }
    }

    fn pattern_matches(&self, index: usize, value: &Value) -> bool {
        match &self.patterns {
            Patterns::Exact(expected) => scalar_eq(&expected[index], value),
            Patterns::Substring(needles) => value
                .as_str()
                .is_some_and(|s| s.contains(needles[index].as_str())),
            Patterns::Regex(res) => value.as_str().is_some_and(|s| res[index].is_match(s)),
        }
    }

    /// Any filter value matches, or every one when `all` is set.
    ///
    /// For collections a filter value matches when any element matches it.
    fn accepts(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return false;
        };
        let elements = value.elements().unwrap_or_else(|| vec![value]);
        let hit = |i: usize| elements.iter().any(|e| self.pattern_matches(i, e));
        if self.all {
            (0..self.len()).all(hit)
        } else {
            (0..self.len()).any(hit)
        }
    }
}

fn scalar_eq(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Float(a), b) => b.as_float().is_some_and(|b| *a == b),
        (Value::Int(a), b) => b.as_int().is_some_and(|b| *a == b),
        (a, b) => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        _ => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

/// Lexicographic comparison over the sort keys; missing values sort last
fn compare_records(a: &Attributes, b: &Attributes, sorts: &[Sort]) -> Ordering {
    for sort in sorts {
        let ord = match (a.get(&sort.key), b.get(&sort.key)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => match sort.direction {
                Direction::Asc => compare_values(x, y),
                Direction::Desc => compare_values(y, x),
            },
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn droplet_config() -> DataListConfig {
        let record = BlockSchema::new()
            .attribute(AttributeSchema::new("id", AttributeType::Int))
            .attribute(AttributeSchema::new("name", AttributeType::String))
            .attribute(AttributeSchema::new("region", AttributeType::String))
            .attribute(AttributeSchema::new("memory", AttributeType::Int))
            .attribute(AttributeSchema::new("price", AttributeType::Float))
            .attribute(AttributeSchema::new("backups", AttributeType::Bool))
            .attribute(AttributeSchema::new(
                "tags",
                AttributeType::set_of(AttributeType::String),
            ));
        DataListConfig::new("digitalocean_droplets", "droplets", record)
            .filter_keys(&["id", "name", "region", "memory", "price", "backups", "tags"])
            .sort_keys(&["id", "name", "region", "memory", "price"])
    }

    fn droplet(id: i64, name: &str, region: &str, memory: i64, tags: &[&str]) -> Attributes {
        Attributes::from([
            ("id".to_string(), Value::Int(id)),
            ("name".to_string(), Value::from(name)),
            ("region".to_string(), Value::from(region)),
            ("memory".to_string(), Value::Int(memory)),
            ("price".to_string(), Value::Float(memory as f64 / 200.0)),
            ("backups".to_string(), Value::Bool(id % 2 == 0)),
            ("tags".to_string(), Value::string_set(tags.iter().copied())),
        ])
    }

    fn fleet() -> Vec<Attributes> {
        vec![
            droplet(1, "a", "nyc1", 1024, &["web"]),
            droplet(2, "b", "nyc1", 2048, &["web", "prod"]),
            droplet(3, "c", "nyc3", 1024, &["db"]),
            droplet(4, "d", "lon1", 4096, &["db", "prod"]),
            droplet(5, "e", "nyc1", 512, &[]),
        ]
    }

    fn names(records: &[Attributes]) -> Vec<String> {
        records
            .iter()
            .map(|r| r["name"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn query(filters: Vec<Filter>, sorts: Vec<Sort>) -> Query {
        Query {
            filters,
            sorts,
            extra: Attributes::new(),
        }
    }

    #[test]
    fn filter_by_region_sort_by_name_desc() {
        let config = droplet_config();
        let q = query(
            vec![Filter::exact("region", &["nyc1"])],
            vec![Sort::new("name", Direction::Desc)],
        );
        let result = config.apply(&q, fleet()).unwrap();
        assert_eq!(names(&result), vec!["e", "b", "a"]);
    }

    #[test]
    fn empty_query_passes_through_in_upstream_order() {
        let config = droplet_config();
        let result = config.apply(&Query::default(), fleet()).unwrap();
        assert_eq!(names(&result), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn filter_groups_are_anded_values_are_ored() {
        let config = droplet_config();
        let q = query(
            vec![
                Filter::exact("region", &["nyc1", "nyc3"]),
                Filter::exact("memory", &["1024"]),
            ],
            vec![],
        );
        assert_eq!(names(&config.apply(&q, fleet()).unwrap()), vec!["a", "c"]);
    }

    #[test]
    fn collection_filters_match_any_element_or_all_values() {
        let config = droplet_config();
        let any = query(vec![Filter::exact("tags", &["prod", "db"])], vec![]);
        assert_eq!(
            names(&config.apply(&any, fleet()).unwrap()),
            vec!["b", "c", "d"]
        );

        let mut all = Filter::exact("tags", &["prod", "db"]);
        all.all = true;
        assert_eq!(
            names(&config.apply(&query(vec![all], vec![]), fleet()).unwrap()),
            vec!["d"]
        );
    }

    #[test]
    fn substring_and_regex_matching() {
        let config = droplet_config();
        let substring = Filter {
            key: "region".to_string(),
            values: vec!["nyc".to_string()],
            match_by: MatchBy::Substring,
            all: false,
        };
        assert_eq!(
            names(&config.apply(&query(vec![substring], vec![]), fleet()).unwrap()),
            vec!["a", "b", "c", "e"]
        );

        let regex = Filter {
            key: "name".to_string(),
            values: vec!["^[cd]$".to_string()],
            match_by: MatchBy::Regex,
            all: false,
        };
        assert_eq!(
            names(&config.apply(&query(vec![regex], vec![]), fleet()).unwrap()),
            vec!["c", "d"]
        );
    }

    #[test]
    fn numeric_and_bool_filters_parse_values() {
        let config = droplet_config();
        let q = query(vec![Filter::exact("price", &["5.12"])], vec![]);
        assert_eq!(names(&config.apply(&q, fleet()).unwrap()), vec!["a", "c"]);

        let q = query(vec![Filter::exact("backups", &["true"])], vec![]);
        assert_eq!(names(&config.apply(&q, fleet()).unwrap()), vec!["b", "d"]);
    }

    #[test]
    fn unparseable_numeric_filter_is_an_error() {
        let config = droplet_config();
        let q = query(vec![Filter::exact("memory", &["lots"])], vec![]);
        assert!(matches!(
            config.apply(&q, fleet()),
            Err(DataListError::InvalidFilterValue { .. })
        ));
    }

    #[test]
    fn substring_on_numbers_is_rejected() {
        let config = droplet_config();
        let filter = Filter {
            key: "memory".to_string(),
            values: vec!["10".to_string()],
            match_by: MatchBy::Substring,
            all: false,
        };
        assert!(matches!(
            config.apply(&query(vec![filter], vec![]), fleet()),
            Err(DataListError::MatchByRequiresString { .. })
        ));
    }

    #[test]
    fn multi_key_sort_is_numeric_and_stable() {
        let config = droplet_config();
        let q = query(
            vec![],
            vec![
                Sort::new("memory", Direction::Asc),
                Sort::new("name", Direction::Desc),
            ],
        );
        assert_eq!(
            names(&config.apply(&q, fleet()).unwrap()),
            vec!["e", "c", "a", "b", "d"]
        );
    }

    #[test]
    fn missing_sort_keys_go_last() {
        let config = droplet_config();
        let mut records = fleet();
        records[0].remove("region");
        let q = query(vec![], vec![Sort::new("region", Direction::Asc)]);
        let sorted = config.apply(&q, records).unwrap();
        assert_eq!(names(&sorted).last().map(String::as_str), Some("a"));
    }

    #[test]
    fn validate_rejects_keys_outside_record_schema() {
        let config = droplet_config().filter_keys(&["size"]);
        assert!(matches!(
            config.validate(),
            Err(DataListError::KeyNotInSchema { .. })
        ));
        let config = droplet_config().sort_keys(&["tags"]);
        assert!(matches!(
            config.validate(),
            Err(DataListError::UnsortableKey { .. })
        ));
        assert!(droplet_config().validate().is_ok());
    }

    #[test]
    fn parse_query_rejects_unknown_keys() {
        let config = droplet_config();
        let attrs = Attributes::from([(
            "filter".to_string(),
            Value::List(vec![Value::Map(Attributes::from([
                ("key".to_string(), Value::from("image")),
                ("values".to_string(), Value::List(vec![Value::from("x")])),
            ]))]),
        )]);
        assert!(matches!(
            config.parse_query(&attrs),
            Err(DataListError::UnknownFilterKey { .. })
        ));
    }

    #[test]
    fn read_sets_result_and_fresh_id() {
        let config = droplet_config();
        let resource = Resource::new("digitalocean_droplets", "nyc")
            .with_read_only(true)
            .with_attribute(
                "sort",
                Value::List(vec![Value::Map(Attributes::from([
                    ("key".to_string(), Value::from("name")),
                    ("direction".to_string(), Value::from("sideways")),
                ]))]),
            );
        let first = config.read(&resource, fleet()).unwrap();
        let second = config.read(&resource, fleet()).unwrap();
        assert_ne!(first.identifier, second.identifier);
        assert_eq!(first.attributes["droplets"], second.attributes["droplets"]);
        match &first.attributes["droplets"] {
            Value::List(items) => assert_eq!(items.len(), 5),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn schema_exposes_blocks_and_result() {
        let schema = droplet_config().schema();
        assert!(schema.get("filter").is_some());
        assert!(schema.get("sort").is_some());
        assert!(schema.get("droplets").is_some_and(|a| a.computed_only));
    }
}
