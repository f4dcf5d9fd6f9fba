use serde_json::Value;

/// Value shape a field accepts
#[derive(Debug, Clone)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    /// RFC 3339 / `YYYY-MM-DD` string or epoch milliseconds
    Date,
    /// 24 hex digits
    ObjectId,
    /// Nested object with its own (optional) keys; unknown keys tolerated
    Object(Vec<FieldRule>),
    /// List whose items all have the given kind; `None` accepts anything
    Array(Option<Box<FieldKind>>),
    Any,
}

impl FieldKind {
    pub fn array_of(kind: FieldKind) -> Self {
        FieldKind::Array(Some(Box::new(kind)))
    }

    pub fn any_array() -> Self {
        FieldKind::Array(None)
    }

    /// Kinds that have a scalar alternative in the filter profile
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            FieldKind::String | FieldKind::Integer | FieldKind::Number | FieldKind::Boolean | FieldKind::Date | FieldKind::ObjectId
        )
    }
}

/// One declared key of a resource
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    pub allow_empty: bool,
    /// Literal values accepted regardless of kind
    pub also_allowed: Vec<Value>,
    /// Filled in on create when the key is absent
    pub default: Option<Value>,
}

impl FieldRule {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            allow_empty: false,
            also_allowed: vec![],
            default: None,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, FieldKind::String)
    }

    /// String that may also be `null` or `""`
    pub fn text(name: &'static str) -> Self {
        Self::string(name).nullable().allow_empty()
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn date(name: &'static str) -> Self {
        Self::new(name, FieldKind::Date)
    }

    pub fn object_id(name: &'static str) -> Self {
        Self::new(name, FieldKind::ObjectId)
    }

    pub fn object(name: &'static str, keys: Vec<FieldRule>) -> Self {
        Self::new(name, FieldKind::Object(keys))
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    pub fn allow(mut self, value: Value) -> Self {
        self.also_allowed.push(value);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}
