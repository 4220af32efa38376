//! Mapping between JSON values and SQL scalars.

use serde_json::Value;
use synclitedb_core::SqlValue;

/// Converts one JSON argument into a SQL scalar.
///
/// Booleans bind as 0/1 and an array of byte values (0-255) binds as a
/// blob. Objects and other arrays are rejected.
///
/// # Errors
///
/// Returns a description of why the value cannot be bound.
pub fn sql_value_from_json(value: &Value) -> Result<SqlValue, String> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else if n.is_u64() {
                Err(format!("integer {n} does not fit in 64 bits"))
            } else {
                n.as_f64()
                    .map(SqlValue::Real)
                    .ok_or_else(|| format!("unrepresentable number {n}"))
            }
        }
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| "arrays bind as blobs and must hold byte values 0-255".to_string())
            })
            .collect::<Result<Vec<u8>, String>>()
            .map(SqlValue::Blob),
        Value::Object(_) => Err("objects cannot be bound as SQL values".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn scalars() {
        assert_eq!(sql_value_from_json(&json!(null)).unwrap(), SqlValue::Null);
        assert_eq!(sql_value_from_json(&json!(true)).unwrap(), SqlValue::Integer(1));
        assert_eq!(sql_value_from_json(&json!(42)).unwrap(), SqlValue::Integer(42));
        assert_eq!(sql_value_from_json(&json!(1.5)).unwrap(), SqlValue::Real(1.5));
        assert_eq!(
            sql_value_from_json(&json!("one")).unwrap(),
            SqlValue::Text("one".into())
        );
    }

    #[test]
    fn byte_arrays_are_blobs() {
        assert_eq!(
            sql_value_from_json(&json!([0, 1, 255])).unwrap(),
            SqlValue::Blob(vec![0, 1, 255])
        );
        assert!(sql_value_from_json(&json!([256])).is_err());
        assert!(sql_value_from_json(&json!(["a"])).is_err());
    }

    #[test]
    fn rejects_objects_and_huge_integers() {
        assert!(sql_value_from_json(&json!({"a": 1})).is_err());
        assert!(sql_value_from_json(&json!(u64::MAX)).is_err());
    }

    #[test]
    fn non_finite_reals_encode_as_null() {
        let encoded = serde_json::to_value(SqlValue::Real(f64::NAN)).unwrap();
        assert_eq!(encoded, Value::Null);
    }

    proptest! {
        #[test]
        fn integers_survive(i in any::<i64>()) {
            let encoded = serde_json::to_value(SqlValue::Integer(i)).unwrap();
            prop_assert_eq!(sql_value_from_json(&encoded).unwrap(), SqlValue::Integer(i));
        }

        #[test]
        fn text_survives(s in ".*") {
            let encoded = serde_json::to_value(SqlValue::Text(s.clone())).unwrap();
            prop_assert_eq!(sql_value_from_json(&encoded).unwrap(), SqlValue::Text(s));
        }
    }
}
