//! Parameter declarations and client data-model projection.
//!
//! Each component type declares its state keys as [`ParamSpec`]s. At build
//! time the exposable keys are projected onto a [`DataModel`]: a named,
//! immutable list of client-side properties. Every mounted view instantiates
//! its own [`DataContainer`] from the shared model.
//!
//! | Declared kind          | Client type                    |
//! |------------------------|--------------------------------|
//! | `Boolean`, `Event`     | `Bool`                         |
//! | `CalendarDate`         | `Date`                         |
//! | `CalendarDateRange`    | `Tuple(Date, Date)`            |
//! | `Color`                | `Color`                        |
//! | `DateRange`            | `Tuple(Datetime, Datetime)`    |
//! | `Date`                 | `Datetime`                     |
//! | `Dict`                 | `Dict(String, Any)`            |
//! | `Integer`              | `Int`                          |
//! | `List`                 | `List(Any)`                    |
//! | `Number`               | `Float`                        |
//! | `NumericTuple(n)`      | `Tuple(Float × n)`             |
//! | `Range`                | `Tuple(Float, Float)`          |
//! | `String`, `Selector`   | `String`                       |
//! | `Tuple(n)`             | `Tuple(Any × n)`               |
//! | `Any`                  | `Any`                          |

use std::fmt;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use serde::Serialize;

use crate::error::SchemaError;
use crate::value::{Changes, Value, values_match};

// ============================================================================
// ParamKind
// ============================================================================

/// Semantic type of a declared state key.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Boolean,
    CalendarDate,
    CalendarDateRange,
    Color,
    DateRange,
    Date,
    Dict,
    Event,
    Integer,
    List,
    Number,
    NumericTuple(usize),
    Range,
    String,
    /// Enumerated choice among fixed options.
    Selector(Vec<Value>),
    Tuple(usize),
    /// Unrecognized kinds project to an opaque client value.
    Any,
}

impl ParamKind {
    /// Client-side type for this kind.
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::Boolean | Self::Event => PropertyType::Bool,
            Self::CalendarDate => PropertyType::Date,
            Self::CalendarDateRange => PropertyType::tuple(PropertyType::Date, 2),
            Self::Color => PropertyType::Color,
            Self::DateRange => PropertyType::tuple(PropertyType::Datetime, 2),
            Self::Date => PropertyType::Datetime,
            Self::Dict => PropertyType::Dict,
            Self::Integer => PropertyType::Int,
            Self::List => PropertyType::List,
            Self::Number => PropertyType::Float,
            Self::NumericTuple(n) => PropertyType::tuple(PropertyType::Float, *n),
            Self::Range => PropertyType::tuple(PropertyType::Float, 2),
            Self::String | Self::Selector(_) => PropertyType::String,
            Self::Tuple(n) => PropertyType::tuple(PropertyType::Any, *n),
            Self::Any => PropertyType::Any,
        }
    }

    /// Whether a value is valid for this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Selector(options) => {
                value.is_null() || options.iter().any(|o| values_match(o, value))
            }
            _ => self.property_type().accepts(value),
        }
    }

    /// Collections may hold children when referenced as a child slot.
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::List | Self::Dict)
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => write!(f, "boolean"),
            Self::CalendarDate => write!(f, "calendar date"),
            Self::CalendarDateRange => write!(f, "calendar date range"),
            Self::Color => write!(f, "color"),
            Self::DateRange => write!(f, "date range"),
            Self::Date => write!(f, "date"),
            Self::Dict => write!(f, "dict"),
            Self::Event => write!(f, "event"),
            Self::Integer => write!(f, "integer"),
            Self::List => write!(f, "list"),
            Self::Number => write!(f, "number"),
            Self::NumericTuple(n) => write!(f, "numeric tuple of {n}"),
            Self::Range => write!(f, "range"),
            Self::String => write!(f, "string"),
            Self::Selector(options) => write!(f, "selector of {} options", options.len()),
            Self::Tuple(n) => write!(f, "tuple of {n}"),
            Self::Any => write!(f, "value"),
        }
    }
}

// ============================================================================
// ParamSpec
// ============================================================================

/// Declaration of one state key.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub default: Value,
    pub doc: Option<String>,
    /// Internal keys are never projected to the client.
    pub internal: bool,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        let default = match kind {
            ParamKind::Boolean | ParamKind::Event => Value::Bool(false),
            ParamKind::List => Value::Array(Vec::new()),
            ParamKind::Dict => Value::Object(Changes::new()),
            ParamKind::String => Value::String(String::new()),
            _ => Value::Null,
        };
        Self {
            name: name.into(),
            kind,
            default,
            doc: None,
            internal: false,
        }
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

// ============================================================================
// PropertyType
// ============================================================================

/// Client-side property type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyType {
    Bool,
    Int,
    Float,
    String,
    Color,
    Date,
    Datetime,
    List,
    Dict,
    Tuple { items: Vec<PropertyType> },
    Any,
}

impl PropertyType {
    fn tuple(item: PropertyType, n: usize) -> Self {
        Self::Tuple {
            items: vec![item; n],
        }
    }

    /// Whether a value can be held by a property of this type.
    ///
    /// `null` is always accepted.
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            Self::Bool => value.is_boolean(),
            Self::Int => value.as_f64().is_some_and(|n| n.fract() == 0.0),
            Self::Float => value.is_number(),
            Self::String | Self::Color | Self::Date | Self::Datetime => value.is_string(),
            Self::List => value.is_array(),
            Self::Dict => value.is_object(),
            Self::Tuple { items } => value.as_array().is_some_and(|values| {
                values.len() == items.len()
                    && items.iter().zip(values).all(|(ty, v)| ty.accepts(v))
            }),
            Self::Any => true,
        }
    }

    /// Whether `current` already holds `new` for this property.
    #[inline]
    pub fn matches(&self, current: &Value, new: &Value) -> bool {
        values_match(current, new)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "Bool"),
            Self::Int => write!(f, "Int"),
            Self::Float => write!(f, "Float"),
            Self::String => write!(f, "String"),
            Self::Color => write!(f, "Color"),
            Self::Date => write!(f, "Date"),
            Self::Datetime => write!(f, "Datetime"),
            Self::List => write!(f, "List(Any)"),
            Self::Dict => write!(f, "Dict(String, Any)"),
            Self::Tuple { items } => {
                write!(f, "Tuple(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Self::Any => write!(f, "Any"),
        }
    }
}

// ============================================================================
// DataModel
// ============================================================================

/// Per-type-name counters for unique data model names.
static MODEL_NAMES: LazyLock<DashMap<String, usize>> = LazyLock::new(DashMap::new);

fn unique_model_name(base: &str) -> String {
    let mut count = MODEL_NAMES.entry(base.to_string()).or_insert(0);
    *count += 1;
    format!("{base}{}", *count)
}

/// One projected client property.
#[derive(Debug, Clone, Serialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: PropertyType,
    pub default: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// Named client-side type definition shared by every view of a type.
#[derive(Debug, Serialize)]
pub struct DataModel {
    name: String,
    properties: Vec<Property>,
}

/// Project `(property name, declaration)` pairs onto a new data model.
///
/// The model name is `type_name` followed by a process-wide counter so that
/// redefining a type never collides with an earlier definition.
pub fn construct_data_model<'a, I>(type_name: &str, params: I) -> Result<DataModel, SchemaError>
where
    I: IntoIterator<Item = (&'a str, &'a ParamSpec)>,
{
    let mut properties = Vec::new();
    for (name, spec) in params {
        let ty = spec.kind.property_type();
        if !spec.kind.accepts(&spec.default) {
            return Err(SchemaError::InvalidDefault {
                param: spec.name.clone(),
                expected: spec.kind.to_string(),
            });
        }
        properties.push(Property {
            name: name.to_string(),
            ty,
            default: spec.default.clone(),
            doc: spec.doc.clone(),
        });
    }

    Ok(DataModel {
        name: unique_model_name(type_name),
        properties,
    })
}

impl DataModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Create a container holding defaults overridden by `values`.
    ///
    /// Values for names outside the model are ignored.
    pub fn instantiate(self: &Arc<Self>, mut values: Changes) -> DataContainer {
        let mut data = Changes::with_capacity(self.properties.len());
        for property in &self.properties {
            let value = values
                .remove(&property.name)
                .unwrap_or_else(|| property.default.clone());
            data.insert(property.name.clone(), value);
        }
        DataContainer {
            model: Arc::clone(self),
            values: data,
        }
    }
}

// ============================================================================
// DataContainer
// ============================================================================

/// Per-view mirror of the client's data container.
#[derive(Debug, Clone)]
pub struct DataContainer {
    model: Arc<DataModel>,
    values: Changes,
}

impl DataContainer {
    pub fn model(&self) -> &DataModel {
        &self.model
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    pub fn contains(&self, property: &str) -> bool {
        self.model.get(property).is_some()
    }

    /// Whether the container already holds `value` for `property`.
    pub fn matches(&self, property: &str, value: &Value) -> bool {
        match (self.model.get(property), self.values.get(property)) {
            (Some(p), Some(current)) => p.ty.matches(current, value),
            _ => false,
        }
    }

    /// Store a value. Names outside the model are ignored.
    pub fn set(&mut self, property: &str, value: Value) {
        if let Some(slot) = self.values.get_mut(property) {
            *slot = value;
        }
    }

    pub fn values(&self) -> &Changes {
        &self.values
    }
}
