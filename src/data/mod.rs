//! Incremental updates of column-oriented data.
//!
//! A component declaring a `data_param` holds a dict of equally long
//! columns (`{"x": [..], "y": [..]}`). Instead of resending the whole dict,
//! [`Streamable::stream`] appends rows and [`Patchable::patch`] edits rows in
//! place; views receive `stream` / `patch` messages and their mirrors are
//! updated to the new full value.
//!
//! Both operations validate completely before anything is changed.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::channel::OutboundMessage;
use crate::component::Component;
use crate::error::{Result, UsageError};
use crate::sync::{Origin, StateValue, SyncContext, deliver};
use crate::value::{Changes, Value};

// ============================================================================
// Column operations
// ============================================================================

fn invalid(msg: impl Into<String>) -> UsageError {
    UsageError::InvalidData(msg.into())
}

fn column<'a>(data: &'a Changes, name: &str) -> Result<&'a Vec<Value>, UsageError> {
    match data.get(name) {
        Some(Value::Array(values)) => Ok(values),
        Some(_) => Err(invalid(format!("column '{name}' is not a list"))),
        None => Err(invalid(format!("unknown column '{name}'"))),
    }
}

/// Number of rows (length of the first column).
pub fn row_count(data: &Changes) -> usize {
    data.values()
        .next()
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

/// Append `new` rows to `current`, keeping at most `rollover` rows.
///
/// An empty `current` is replaced by `new`. Otherwise `new` must provide
/// exactly the existing columns.
pub fn stream_columns(current: &mut Changes, new: &Changes, rollover: Option<usize>) -> Result<(), UsageError> {
    for name in new.keys() {
        if !matches!(new.get(name), Some(Value::Array(_))) {
            return Err(invalid(format!("column '{name}' is not a list")));
        }
    }

    if current.is_empty() {
        *current = new.clone();
    } else {
        let same_columns = current.len() == new.len() && current.keys().all(|k| new.contains_key(k));
        if !same_columns {
            return Err(invalid("Stream update must append to all columns"));
        }
        for name in current.keys() {
            column(current, name)?;
        }
        for (name, values) in current.iter_mut() {
            if let (Value::Array(values), Some(Value::Array(rows))) = (values, new.get(name)) {
                values.extend(rows.iter().cloned());
            }
        }
    }

    if let Some(limit) = rollover {
        for values in current.values_mut() {
            if let Value::Array(values) = values
                && values.len() > limit
            {
                values.drain(..values.len() - limit);
            }
        }
    }
    Ok(())
}

/// Row target of one patch: a single index or a `{start, stop, step}` slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Index(usize),
    Slice { start: usize, stop: usize, step: usize },
}

impl Target {
    fn parse(value: &Value, len: usize) -> Result<Self, UsageError> {
        match value {
            Value::Number(n) => {
                let index = n
                    .as_u64()
                    .ok_or_else(|| invalid(format!("patch index {n} is not a row index")))?
                    as usize;
                if index >= len {
                    return Err(invalid(format!("patch index {index} out of range for {len} rows")));
                }
                Ok(Self::Index(index))
            }
            Value::Object(slice) => {
                let bound = |key: &str, default: usize| -> Result<usize, UsageError> {
                    match slice.get(key) {
                        None | Some(Value::Null) => Ok(default),
                        Some(v) => v
                            .as_u64()
                            .map(|n| n as usize)
                            .ok_or_else(|| invalid(format!("slice {key} must be a non-negative integer"))),
                    }
                };
                let start = bound("start", 0)?;
                let stop = bound("stop", len)?.min(len);
                let step = bound("step", 1)?;
                if step == 0 {
                    return Err(invalid("slice step cannot be zero"));
                }
                Ok(Self::Slice { start, stop, step })
            }
            other => Err(invalid(format!("unsupported patch target {other}"))),
        }
    }

    fn indices(self) -> Vec<usize> {
        match self {
            Self::Index(i) => vec![i],
            Self::Slice { start, stop, step } => (start..stop).step_by(step).collect(),
        }
    }
}

/// Apply `patches` (column → `[[target, value], ...]`) to `current`.
pub fn patch_columns(current: &mut Changes, patches: &Changes) -> Result<(), UsageError> {
    let mut patched = current.clone();
    for (name, edits) in patches {
        let len = column(&patched, name)?.len();
        let Value::Array(edits) = edits else {
            return Err(invalid(format!("patches for '{name}' must be a list")));
        };

        let mut writes = Vec::new();
        for edit in edits {
            let pair = edit
                .as_array()
                .filter(|pair| pair.len() == 2)
                .ok_or_else(|| invalid(format!("patch for '{name}' must be a [target, value] pair")))?;
            let indices = Target::parse(&pair[0], len)?.indices();
            match (&pair[0], &pair[1]) {
                (Value::Object(_), Value::Array(values)) if values.len() == indices.len() => {
                    writes.extend(indices.into_iter().zip(values.iter().cloned()));
                }
                (Value::Object(_), _) => {
                    return Err(invalid(format!(
                        "slice patch for '{name}' needs {} values",
                        indices.len()
                    )));
                }
                (_, value) => writes.extend(indices.into_iter().map(|i| (i, value.clone()))),
            }
        }

        if let Some(Value::Array(values)) = patched.get_mut(name) {
            for (index, value) in writes {
                values[index] = value;
            }
        }
    }
    *current = patched;
    Ok(())
}

// ============================================================================
// Capability traits
// ============================================================================

pub trait Streamable {
    /// Append rows to the data parameter.
    fn stream(&self, ctx: &SyncContext, data: Changes, rollover: Option<usize>) -> Result<()>;
}

pub trait Patchable {
    /// Edit rows of the data parameter in place.
    fn patch(&self, ctx: &SyncContext, patches: Changes) -> Result<()>;
}

pub trait Selectable {
    fn select(&self, ctx: &SyncContext, indices: Vec<usize>) -> Result<()>;

    fn selected(&self) -> Vec<usize>;
}

impl Component {
    fn data_param(&self) -> Result<String, UsageError> {
        self.inner
            .kind
            .data_param
            .clone()
            .ok_or_else(|| invalid(format!("{} declares no data parameter", self.inner.kind.name)))
    }

    fn columns(&self, param: &str) -> Changes {
        match self.value(param) {
            Some(Value::Object(columns)) => columns,
            _ => Changes::new(),
        }
    }

    /// Store the new column dict without an `update` message, then send
    /// `message` and refresh every view mirror.
    fn apply_columns(&self, ctx: &SyncContext, param: String, columns: Changes, message: OutboundMessage) -> Result<()> {
        let full = Value::Object(columns);
        self.inner.updating.store(true, Ordering::SeqCst);
        let result = self.apply(ctx, vec![(param.clone(), StateValue::Data(full.clone()))], Origin::Server);
        self.inner.updating.store(false, Ordering::SeqCst);
        result?;

        let Some(property) = self.inner.kind.transforms.property_name(&param).map(str::to_string) else {
            return Ok(());
        };
        let message = Arc::new(message);
        self.for_each_view(ctx, move |component, _, root, view| {
            let staged = {
                let mut views = component.inner.views.lock();
                let Some(v) = views.get_mut(&root).filter(|v| v.id == view) else {
                    return;
                };
                v.data.set(&property, full.clone());
                (v.target(component.id()), Arc::clone(&v.channel), v.document.clone())
            };
            let (target, channel, document) = staged;
            deliver(&channel, &target, (*message).clone());
            document.touch(&channel);
        });
        Ok(())
    }
}

impl Streamable for Component {
    fn stream(&self, ctx: &SyncContext, data: Changes, rollover: Option<usize>) -> Result<()> {
        let param = self.data_param()?;
        let mut columns = self.columns(&param);
        stream_columns(&mut columns, &data, rollover)?;

        let property = self
            .inner
            .kind
            .transforms
            .property_name(&param)
            .unwrap_or(&param)
            .to_string();
        crate::debug!("sync"; "{} streaming {} row(s) into {}", self.id(), row_count(&data), param);
        self.apply_columns(ctx, param, columns, OutboundMessage::Stream { property, data, rollover })
    }
}

impl Patchable for Component {
    fn patch(&self, ctx: &SyncContext, patches: Changes) -> Result<()> {
        let param = self.data_param()?;
        let mut columns = self.columns(&param);
        patch_columns(&mut columns, &patches)?;

        let property = self
            .inner
            .kind
            .transforms
            .property_name(&param)
            .unwrap_or(&param)
            .to_string();
        self.apply_columns(ctx, param, columns, OutboundMessage::Patch { property, patches })
    }
}

impl Selectable for Component {
    fn select(&self, ctx: &SyncContext, indices: Vec<usize>) -> Result<()> {
        let kind = &self.inner.kind;
        let param = kind
            .selection_param
            .clone()
            .ok_or_else(|| invalid(format!("{} declares no selection parameter", kind.name)))?;
        if let Some(data) = kind.data_param.as_deref() {
            let rows = row_count(&self.columns(data));
            if let Some(bad) = indices.iter().find(|i| **i >= rows) {
                return Err(invalid(format!("selection index {bad} out of range for {rows} rows")).into());
            }
        }
        let value = Value::Array(indices.into_iter().map(Value::from).collect());
        self.set_with(ctx, [(param, value)])
    }

    fn selected(&self) -> Vec<usize> {
        self.inner
            .kind
            .selection_param
            .as_deref()
            .and_then(|p| self.value(p))
            .and_then(|v| {
                v.as_array()
                    .map(|items| items.iter().filter_map(|i| i.as_u64().map(|i| i as usize)).collect())
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cols(value: Value) -> Changes {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_stream_appends_and_rolls_over() {
        let mut data = cols(json!({"x": [1, 2], "y": [3, 4]}));
        stream_columns(&mut data, &cols(json!({"x": [5], "y": [6]})), None).unwrap();
        assert_eq!(Value::Object(data.clone()), json!({"x": [1, 2, 5], "y": [3, 4, 6]}));

        stream_columns(&mut data, &cols(json!({"x": [7], "y": [8]})), Some(2)).unwrap();
        assert_eq!(Value::Object(data), json!({"x": [5, 7], "y": [6, 8]}));
    }

    #[test]
    fn test_stream_requires_all_columns() {
        let mut data = cols(json!({"x": [1], "y": [2]}));
        let err = stream_columns(&mut data, &cols(json!({"x": [3]})), None).unwrap_err();
        assert!(err.to_string().contains("Stream update must append to all columns"));
        assert_eq!(Value::Object(data), json!({"x": [1], "y": [2]}));
    }

    #[test]
    fn test_stream_into_empty_replaces() {
        let mut data = Changes::new();
        stream_columns(&mut data, &cols(json!({"a": [1]})), None).unwrap();
        assert_eq!(row_count(&data), 1);
    }

    #[test]
    fn test_patch_index_and_slice() {
        let mut data = cols(json!({"x": [0, 0, 0, 0], "y": ["a", "b", "c", "d"]}));
        let patches = cols(json!({
            "x": [[1, 10], [{"start": 2, "stop": 4}, [20, 30]]],
            "y": [[{"step": 2}, ["A", "C"]]]
        }));
        patch_columns(&mut data, &patches).unwrap();
        assert_eq!(
            Value::Object(data),
            json!({"x": [0, 10, 20, 30], "y": ["A", "b", "C", "d"]})
        );
    }

    #[test]
    fn test_patch_out_of_range_is_atomic() {
        let mut data = cols(json!({"x": [0, 0]}));
        let patches = cols(json!({"x": [[0, 1], [5, 2]]}));
        assert!(patch_columns(&mut data, &patches).is_err());
        assert_eq!(Value::Object(data), json!({"x": [0, 0]}));
    }
}
