//! Time-series data point model.
//!
//! A `DataPoint` is the unit written to the destination: a measurement name,
//! indexed string tags, scalar fields and a timestamp.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

/// Scalar value carried by a point field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit float.
    Float(f64),
    /// Signed integer.
    Integer(i64),
    /// Unsigned integer that does not fit in `i64`.
    UInteger(u64),
    /// Boolean.
    Boolean(bool),
    /// UTF-8 string.
    String(String),
}

impl FieldValue {
    /// Coerces a JSON property value into its scalar field representation.
    ///
    /// Numbers keep their integer-ness, `null` becomes the string `"null"`
    /// and arrays/objects become their compact JSON text.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Bool(b) => Self::Boolean(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInteger(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Self::String(s.clone()),
            Value::Null => Self::String("null".to_string()),
            Value::Array(_) | Value::Object(_) => Self::String(value.to_string()),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::UInteger(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u8> for FieldValue {
    fn from(v: u8) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Self::UInteger(v), Self::Integer)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Errors raised when a point would violate its invariants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PointError {
    /// The measurement name is empty.
    #[error("Measurement name cannot be empty")]
    EmptyName,

    /// A tag key is empty.
    #[error("Tag key cannot be empty")]
    EmptyTagKey,

    /// A field key is empty.
    #[error("Field key cannot be empty")]
    EmptyFieldKey,

    /// The point has no fields.
    #[error("Point must carry at least one field")]
    NoFields,

    /// A float field is NaN or infinite.
    #[error("Field '{0}' is not a finite number")]
    NonFiniteField(String),

    /// The timestamp cannot be expressed as nanoseconds since the epoch.
    #[error("Timestamp {0} is outside the nanosecond range (1677 to 2262)")]
    TimestampOutOfRange(DateTime<Utc>),
}

/// One measurement record destined for a time-series store.
///
/// Points are immutable once built; use [`DataPoint::builder`].
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    name: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: DateTime<Utc>,
    timestamp_nanos: i64,
}

impl DataPoint {
    /// Starts building a point for the given measurement.
    ///
    /// # Example
    ///
    /// ```
    /// use sink::models::{DataPoint, FieldValue};
    ///
    /// let point = DataPoint::builder("syslog")
    ///     .tag("host", "web-1")
    ///     .field("severity_code", 6_i64)
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(point.tag("host"), Some("web-1"));
    /// assert_eq!(point.field("severity_code"), Some(&FieldValue::Integer(6)));
    /// ```
    #[must_use]
    pub fn builder(name: impl Into<String>) -> DataPointBuilder {
        DataPointBuilder {
            name: name.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Measurement name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags in key order.
    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Fields in key order.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Point timestamp (UTC).
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Point timestamp as nanoseconds since the Unix epoch.
    #[must_use]
    pub fn timestamp_nanos(&self) -> i64 {
        self.timestamp_nanos
    }

    /// Looks up a tag value.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Looks up a field value.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
}

/// Builder for [`DataPoint`].
///
/// Setting a key twice keeps the last value.
#[derive(Debug, Clone)]
pub struct DataPointBuilder {
    name: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: DateTime<Utc>,
}

impl DataPointBuilder {
    /// Sets a tag.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Sets a field.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Sets the point timestamp.
    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Validates and builds the point.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The measurement name or any tag/field key is empty
    /// - There are no fields
    /// - A float field is NaN or infinite
    /// - The timestamp does not fit in `i64` nanoseconds
    pub fn build(self) -> Result<DataPoint, PointError> {
        if self.name.is_empty() {
            return Err(PointError::EmptyName);
        }
        if self.tags.keys().any(String::is_empty) {
            return Err(PointError::EmptyTagKey);
        }
        if self.fields.is_empty() {
            return Err(PointError::NoFields);
        }
        for (key, value) in &self.fields {
            if key.is_empty() {
                return Err(PointError::EmptyFieldKey);
            }
            if let FieldValue::Float(v) = value {
                if !v.is_finite() {
                    return Err(PointError::NonFiniteField(key.clone()));
                }
            }
        }

        let timestamp_nanos = self
            .timestamp
            .timestamp_nanos_opt()
            .ok_or(PointError::TimestampOutOfRange(self.timestamp))?;

        Ok(DataPoint {
            name: self.name,
            tags: self.tags,
            fields: self.fields,
            timestamp: self.timestamp,
            timestamp_nanos,
        })
    }
}
