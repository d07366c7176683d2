//! Conversion between `serde_json::Value` and Boa `JsValue`.
//!
//! All inputs and outputs of bidding scripts are JSON-shaped, so these two
//! walks are the entire JavaScript boundary. Symbols and undefined property
//! values are dropped when reading results back, matching what
//! `JSON.stringify` would do.

use boa_engine::object::builtins::JsArray;
use boa_engine::object::JsObject;
use boa_engine::property::PropertyKey;
use boa_engine::value::JsValue;
use boa_engine::{js_string, Context};
use serde_json::Value;

use bidbox_common::status::{Result, Status};

/// Converts a JSON value into a `JsValue` inside the given context.
pub fn json_to_js(json: Value, ctx: &mut Context) -> Result<JsValue> {
    match json {
        Value::Null => Ok(JsValue::null()),
        Value::Bool(b) => Ok(JsValue::new(b)),
        Value::Number(n) => n
            .as_f64()
            .map(JsValue::new)
            .or_else(|| n.as_i64().map(JsValue::new))
            .ok_or_else(|| Status::internal("Numeric input is not representable")),
        Value::String(s) => Ok(JsValue::new(js_string!(s))),
        Value::Array(items) => {
            let array = JsArray::new(ctx);
            for item in items {
                let element = json_to_js(item, ctx)?;
                array
                    .push(element, ctx)
                    .map_err(|e| Status::internal(format!("Unable to build input array: {e}")))?;
            }
            Ok(array.into())
        }
        Value::Object(fields) => {
            let object = JsObject::with_object_proto(ctx.intrinsics());
            for (key, value) in fields {
                let element = json_to_js(value, ctx)?;
                object
                    .create_data_property_or_throw(js_string!(key), element, ctx)
                    .map_err(|e| Status::internal(format!("Unable to build input object: {e}")))?;
            }
            Ok(object.into())
        }
    }
}

/// Converts a `JsValue` back into JSON.
///
/// `undefined` and `null` both map to JSON null at the top level; inside
/// objects, properties holding `undefined` are omitted entirely.
pub fn js_to_json(value: JsValue, ctx: &mut Context) -> Result<Value> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }
    if let Some(b) = value.as_boolean() {
        return Ok(Value::Bool(b));
    }
    if let Some(n) = value.as_number() {
        if n.fract() == 0.0 && n.is_finite() && (i32::MIN as f64..=i32::MAX as f64).contains(&n) {
            return Ok(Value::Number((n as i32).into()));
        }
        return serde_json::Number::from_f64(n)
            .map(Value::Number)
            .ok_or_else(|| Status::internal("Script produced a non-finite number"));
    }
    if let Some(s) = value.as_string() {
        return Ok(Value::String(s.to_std_string().map_err(|e| {
            Status::internal(format!("Script produced an unpaired surrogate string: {e:?}"))
        })?));
    }
    if let Some(object) = value.as_object() {
        if object.is_array() {
            let array = JsArray::from_object(object.clone())
                .map_err(|e| Status::internal(format!("Unable to read result array: {e}")))?;
            let length: usize = array
                .length(ctx)
                .map_err(|e| Status::internal(format!("Unable to read result array: {e}")))?
                .try_into()
                .map_err(|_| Status::internal("Result array length overflow"))?;
            let mut items = Vec::with_capacity(length);
            for index in 0..length {
                let element = array.get(index, ctx).map_err(|e| {
                    Status::internal(format!("Unable to read result array element: {e}"))
                })?;
                items.push(js_to_json(element, ctx)?);
            }
            return Ok(Value::Array(items));
        }

        let keys = object
            .own_property_keys(ctx)
            .map_err(|e| Status::internal(format!("Unable to enumerate result object: {e}")))?;
        let mut fields = serde_json::Map::new();
        for key in keys {
            let name = match &key {
                PropertyKey::String(s) => s.to_std_string().map_err(|e| {
                    Status::internal(format!("Result object key is not valid UTF-16: {e:?}"))
                })?,
                PropertyKey::Index(i) => i.get().to_string(),
                PropertyKey::Symbol(_) => continue,
            };
            let property = object
                .get(key, ctx)
                .map_err(|e| Status::internal(format!("Unable to read result property: {e}")))?;
            if property.is_undefined() {
                continue;
            }
            fields.insert(name, js_to_json(property, ctx)?);
        }
        return Ok(Value::Object(fields));
    }
    // Symbols and anything else without a JSON representation.
    Ok(Value::Null)
}
