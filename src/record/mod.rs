//! Typed tuple records whose durable storage is the message history of a
//! Discord channel.  Each record is one message; the message content is the
//! serialized tuple.

pub mod codec;
pub mod store;
pub mod value;

pub use store::{RecordStore, Records, WritePolicy};
pub use value::{EmojiRef, Field, FieldKind, MessageRef, Stamp, Value};

/// Fixed, ordered description of one record class.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [Field],
}

/// One decoded tuple.  Values appear in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record(Vec<Value>);

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record store `{0}` has not been synchronized yet")]
    NotSynced(&'static str),
    #[error("record store `{0}` does not accept writes from this identity")]
    NotWritable(&'static str),
    #[error("value does not fit schema `{schema}`: {reason}")]
    Mismatch {
        schema: &'static str,
        reason: String,
    },
}

impl Record {
    /// Build a record, checking arity and per-field kinds against the schema.
    /// Null is accepted in any position.
    pub fn new(schema: &Schema, values: Vec<Value>) -> Result<Self, RecordError> {
        if values.len() != schema.fields.len() {
            return Err(RecordError::Mismatch {
                schema: schema.name,
                reason: format!(
                    "expected {} fields, got {}",
                    schema.fields.len(),
                    values.len()
                ),
            });
        }
        for (field, value) in schema.fields.iter().zip(&values) {
            if !value.fits(field.kind) {
                return Err(RecordError::Mismatch {
                    schema: schema.name,
                    reason: format!("field `{}` is not a {:?}", field.name, field.kind),
                });
            }
        }
        Ok(Self(values))
    }

    /// Used by the decoder, which produces values in schema order by
    /// construction.
    pub(crate) fn from_decoded(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Replace one field, keeping the schema's kind discipline.
    pub fn set(
        &mut self,
        schema: &Schema,
        index: usize,
        value: Value,
    ) -> Result<(), RecordError> {
        let field = schema.fields.get(index).ok_or(RecordError::Mismatch {
            schema: schema.name,
            reason: format!("no field at index {}", index),
        })?;
        if !value.fits(field.kind) {
            return Err(RecordError::Mismatch {
                schema: schema.name,
                reason: format!("field `{}` is not a {:?}", field.name, field.kind),
            });
        }
        self.0[index] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: Schema = Schema {
        name: "pair",
        fields: &[
            Field {
                name: "count",
                kind: FieldKind::Int,
            },
            Field {
                name: "label",
                kind: FieldKind::Str,
            },
        ],
    };

    #[test]
    fn record_checks_arity() {
        let err = Record::new(&SCHEMA, vec![Value::Int(1)]).unwrap_err();
        assert!(matches!(err, RecordError::Mismatch { .. }));
    }

    #[test]
    fn record_checks_kinds() {
        let err =
            Record::new(&SCHEMA, vec![Value::Bool(true), Value::Str("x".into())]).unwrap_err();
        assert!(matches!(err, RecordError::Mismatch { .. }));
    }

    #[test]
    fn null_fits_any_field() {
        let record = Record::new(&SCHEMA, vec![Value::Null, Value::Null]).unwrap();
        assert_eq!(record.values(), &[Value::Null, Value::Null]);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut record =
            Record::new(&SCHEMA, vec![Value::Int(1), Value::Str("a".into())]).unwrap();
        record.set(&SCHEMA, 0, Value::Int(2)).unwrap();
        assert_eq!(record.get(0), Some(&Value::Int(2)));
        assert!(record.set(&SCHEMA, 1, Value::Bool(false)).is_err());
    }
}
