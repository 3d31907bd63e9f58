//! Values crossing the registry runtime boundary.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// A marshalled argument or return value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
	#[default]
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(String),
	List(Vec<Value>),
	Map(BTreeMap<String, Value>),
}

/// Reasons a value cannot cross the boundary or be decoded on this side.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarshalError {
	#[error("value nests deeper than {limit} levels")]
	TooDeep { limit: usize },
	#[error("value has more than {limit} nodes")]
	TooManyNodes { limit: usize },
	#[error("string of {len} bytes exceeds the {limit} byte limit")]
	StringTooLong { len: usize, limit: usize },
	#[error("non-finite float cannot be represented")]
	NonFiniteFloat,
	#[error("integer {0} is outside the 64-bit signed range")]
	IntegerOutOfRange(String),
	#[error("expected {expected}, found {found}")]
	Type { expected: &'static str, found: &'static str },
	#[error("{0}")]
	Serde(String),
	/// Reported by the remote side.
	#[error("{0}")]
	Remote(String),
}

impl Value {
	/// Type label used in error messages.
	pub const fn kind(&self) -> &'static str {
		match self {
			Self::Null => "null",
			Self::Bool(_) => "bool",
			Self::Int(_) => "int",
			Self::Float(_) => "float",
			Self::Str(_) => "string",
			Self::List(_) => "list",
			Self::Map(_) => "map",
		}
	}

	pub const fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(s) => Some(s),
			_ => None,
		}
	}

	pub const fn as_int(&self) -> Option<i64> {
		match self {
			Self::Int(i) => Some(*i),
			_ => None,
		}
	}

	/// Parses JSON text. Integer literals outside `i64` are rejected rather
	/// than read as floats.
	pub fn parse_json(text: &str) -> Result<Self, MarshalError> {
		let json: JsonValue = serde_json::from_str(text).map_err(|e| MarshalError::Serde(e.to_string()))?;
		if let Some(literal) = trustfacts_rpc::host::wide_integer(text.as_bytes()) {
			return Err(MarshalError::IntegerOutOfRange(literal));
		}
		Self::from_json(json)
	}

	/// Converts from parsed JSON.
	///
	/// Unsigned integers beyond `i64` are rejected. Wider literals have
	/// already become floats by the time JSON is parsed; check the text with
	/// [`Value::parse_json`] when it is available.
	pub fn from_json(json: JsonValue) -> Result<Self, MarshalError> {
		Ok(match json {
			JsonValue::Null => Self::Null,
			JsonValue::Bool(b) => Self::Bool(b),
			JsonValue::Number(n) => {
				if let Some(i) = n.as_i64() {
					Self::Int(i)
				} else if n.is_u64() {
					return Err(MarshalError::IntegerOutOfRange(n.to_string()));
				} else {
					Self::Float(n.as_f64().ok_or(MarshalError::NonFiniteFloat)?)
				}
			}
			JsonValue::String(s) => Self::Str(s),
			JsonValue::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect::<Result<_, _>>()?),
			JsonValue::Object(map) => Self::Map(
				map.into_iter()
					.map(|(k, v)| Self::from_json(v).map(|v| (k, v)))
					.collect::<Result<_, _>>()?,
			),
		})
	}

	/// Converts to JSON.
	pub fn to_json(&self) -> Result<JsonValue, MarshalError> {
		Ok(match self {
			Self::Null => JsonValue::Null,
			Self::Bool(b) => JsonValue::Bool(*b),
			Self::Int(i) => JsonValue::from(*i),
			Self::Float(f) => JsonValue::Number(serde_json::Number::from_f64(*f).ok_or(MarshalError::NonFiniteFloat)?),
			Self::Str(s) => JsonValue::String(s.clone()),
			Self::List(items) => JsonValue::Array(items.iter().map(Self::to_json).collect::<Result<_, _>>()?),
			Self::Map(map) => JsonValue::Object(
				map.iter()
					.map(|(k, v)| v.to_json().map(|v| (k.clone(), v)))
					.collect::<Result<_, _>>()?,
			),
		})
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.to_json() {
			Ok(json) => write!(f, "{json}"),
			Err(_) => write!(f, "{self:?}"),
		}
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Self::Bool(b)
	}
}

impl From<i64> for Value {
	fn from(i: i64) -> Self {
		Self::Int(i)
	}
}

impl From<i32> for Value {
	fn from(i: i32) -> Self {
		Self::Int(i.into())
	}
}

impl From<f64> for Value {
	fn from(f: f64) -> Self {
		Self::Float(f)
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Self::Str(s.to_owned())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Self::Str(s)
	}
}

impl<T: Into<Value>> From<Vec<T>> for Value {
	fn from(items: Vec<T>) -> Self {
		Self::List(items.into_iter().map(Into::into).collect())
	}
}

/// Safety budget for values crossing the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarshalBudget {
	pub max_depth: usize,
	/// Counted over all values of one call together.
	pub max_nodes: usize,
	pub max_string_len: usize,
}

impl Default for MarshalBudget {
	fn default() -> Self {
		Self {
			max_depth: 32,
			max_nodes: 50_000,
			max_string_len: 1024 * 1024,
		}
	}
}

impl MarshalBudget {
	/// Checks one value.
	pub fn check(&self, value: &Value) -> Result<(), MarshalError> {
		let mut nodes = 0;
		self.visit(value, 1, &mut nodes)
	}

	/// Checks a whole argument list against one shared node count.
	pub fn check_all(&self, values: &[Value]) -> Result<(), MarshalError> {
		let mut nodes = 0;
		values.iter().try_for_each(|value| self.visit(value, 1, &mut nodes))
	}

	fn visit(&self, value: &Value, depth: usize, nodes: &mut usize) -> Result<(), MarshalError> {
		if depth > self.max_depth {
			return Err(MarshalError::TooDeep { limit: self.max_depth });
		}
		*nodes += 1;
		if *nodes > self.max_nodes {
			return Err(MarshalError::TooManyNodes { limit: self.max_nodes });
		}
		match value {
			Value::Float(f) if !f.is_finite() => Err(MarshalError::NonFiniteFloat),
			Value::Str(s) => self.check_len(s),
			Value::List(items) => items.iter().try_for_each(|item| self.visit(item, depth + 1, nodes)),
			Value::Map(map) => map.iter().try_for_each(|(key, item)| {
				self.check_len(key)?;
				self.visit(item, depth + 1, nodes)
			}),
			_ => Ok(()),
		}
	}

	fn check_len(&self, s: &str) -> Result<(), MarshalError> {
		if s.len() > self.max_string_len {
			return Err(MarshalError::StringTooLong {
				len: s.len(),
				limit: self.max_string_len,
			});
		}
		Ok(())
	}
}

/// Conversion of a typed argument into a [`Value`].
pub trait IntoValue {
	fn into_value(self) -> Result<Value, MarshalError>;
}

/// Conversion of a returned [`Value`] into a typed result.
pub trait FromValue: Sized {
	fn from_value(value: Value) -> Result<Self, MarshalError>;
}

fn mismatch<T>(expected: &'static str, found: &Value) -> Result<T, MarshalError> {
	Err(MarshalError::Type {
		expected,
		found: found.kind(),
	})
}

impl IntoValue for Value {
	fn into_value(self) -> Result<Value, MarshalError> {
		Ok(self)
	}
}

impl FromValue for Value {
	fn from_value(value: Value) -> Result<Self, MarshalError> {
		Ok(value)
	}
}

impl IntoValue for () {
	fn into_value(self) -> Result<Value, MarshalError> {
		Ok(Value::Null)
	}
}

impl FromValue for () {
	fn from_value(value: Value) -> Result<Self, MarshalError> {
		match value {
			Value::Null => Ok(()),
			other => mismatch("null", &other),
		}
	}
}

impl IntoValue for bool {
	fn into_value(self) -> Result<Value, MarshalError> {
		Ok(Value::Bool(self))
	}
}

impl FromValue for bool {
	fn from_value(value: Value) -> Result<Self, MarshalError> {
		match value {
			Value::Bool(b) => Ok(b),
			other => mismatch("bool", &other),
		}
	}
}

impl IntoValue for i64 {
	fn into_value(self) -> Result<Value, MarshalError> {
		Ok(Value::Int(self))
	}
}

impl FromValue for i64 {
	fn from_value(value: Value) -> Result<Self, MarshalError> {
		match value {
			Value::Int(i) => Ok(i),
			other => mismatch("int", &other),
		}
	}
}

macro_rules! int_via_i64 {
	($($ty:ty),*) => {
		$(
		impl IntoValue for $ty {
			fn into_value(self) -> Result<Value, MarshalError> {
				i64::try_from(self)
					.map(Value::Int)
					.map_err(|_| MarshalError::IntegerOutOfRange(self.to_string()))
			}
		}

		impl FromValue for $ty {
			fn from_value(value: Value) -> Result<Self, MarshalError> {
				let i = i64::from_value(value)?;
				<$ty>::try_from(i).map_err(|_| MarshalError::IntegerOutOfRange(i.to_string()))
			}
		}
		)*
	};
}

int_via_i64!(i32, u32, u64, usize);

impl IntoValue for f64 {
	fn into_value(self) -> Result<Value, MarshalError> {
		if self.is_finite() { Ok(Value::Float(self)) } else { Err(MarshalError::NonFiniteFloat) }
	}
}

impl FromValue for f64 {
	fn from_value(value: Value) -> Result<Self, MarshalError> {
		match value {
			Value::Float(f) => Ok(f),
			#[allow(clippy::cast_precision_loss, reason = "callees freely return ints where floats are expected")]
			Value::Int(i) => Ok(i as f64),
			other => mismatch("float", &other),
		}
	}
}

impl IntoValue for String {
	fn into_value(self) -> Result<Value, MarshalError> {
		Ok(Value::Str(self))
	}
}

impl IntoValue for &str {
	fn into_value(self) -> Result<Value, MarshalError> {
		Ok(Value::Str(self.to_owned()))
	}
}

impl FromValue for String {
	fn from_value(value: Value) -> Result<Self, MarshalError> {
		match value {
			Value::Str(s) => Ok(s),
			other => mismatch("string", &other),
		}
	}
}

impl<T: IntoValue> IntoValue for Option<T> {
	fn into_value(self) -> Result<Value, MarshalError> {
		self.map_or(Ok(Value::Null), IntoValue::into_value)
	}
}

impl<T: FromValue> FromValue for Option<T> {
	fn from_value(value: Value) -> Result<Self, MarshalError> {
		match value {
			Value::Null => Ok(None),
			other => T::from_value(other).map(Some),
		}
	}
}

impl<T: IntoValue> IntoValue for Vec<T> {
	fn into_value(self) -> Result<Value, MarshalError> {
		self.into_iter().map(IntoValue::into_value).collect::<Result<_, _>>().map(Value::List)
	}
}

impl<T: FromValue> FromValue for Vec<T> {
	fn from_value(value: Value) -> Result<Self, MarshalError> {
		match value {
			Value::List(items) => items.into_iter().map(T::from_value).collect(),
			other => mismatch("list", &other),
		}
	}
}

impl<T: IntoValue> IntoValue for BTreeMap<String, T> {
	fn into_value(self) -> Result<Value, MarshalError> {
		self.into_iter()
			.map(|(k, v)| v.into_value().map(|v| (k, v)))
			.collect::<Result<_, _>>()
			.map(Value::Map)
	}
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
	fn from_value(value: Value) -> Result<Self, MarshalError> {
		match value {
			Value::Map(map) => map.into_iter().map(|(k, v)| T::from_value(v).map(|v| (k, v))).collect(),
			other => mismatch("map", &other),
		}
	}
}

/// Marshals any serde type through its JSON representation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoValue for Json<T> {
	fn into_value(self) -> Result<Value, MarshalError> {
		let json = serde_json::to_value(&self.0).map_err(|e| MarshalError::Serde(e.to_string()))?;
		Value::from_json(json)
	}
}

impl<T: DeserializeOwned> FromValue for Json<T> {
	fn from_value(value: Value) -> Result<Self, MarshalError> {
		let json = value.to_json()?;
		serde_json::from_value(json).map(Json).map_err(|e| MarshalError::Serde(e.to_string()))
	}
}
