use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Result, TrainError};
use crate::tensor::{Device, Tensor};

/// Field every batch must carry; it is what the model consumes.
pub const INPUT: &str = "input";
/// Reserved side-information field; never transferred to a device.
pub const META: &str = "meta";

/// One step's worth of data: named tensors sharing a leading (batch)
/// dimension, plus optional non-numeric `meta`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    fields: BTreeMap<String, Tensor>,
    meta: Option<Value>,
}

impl Batch {
    pub fn new() -> Batch {
        Batch::default()
    }

    /// Adds a tensor field. Fails if the name is reserved or the leading
    /// dimension disagrees with fields already present.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Result<()> {
        let name = name.into();
        if name == META {
            return Err(TrainError::Shape(format!("`{META}` is reserved for side information")));
        }
        if let Some((other, existing)) = self.fields.iter().find(|(k, _)| **k != name) {
            if existing.rows() != tensor.rows() {
                return Err(TrainError::Shape(format!(
                    "field `{name}` has {} rows but `{other}` has {}",
                    tensor.rows(),
                    existing.rows()
                )));
            }
        }
        self.fields.insert(name, tensor);
        Ok(())
    }

    /// Assembles a batch from fields the caller already built with a shared
    /// leading dimension.
    pub(crate) fn from_parts(fields: BTreeMap<String, Tensor>, meta: Option<Value>) -> Batch {
        Batch { fields, meta }
    }

    pub fn with(mut self, name: impl Into<String>, tensor: Tensor) -> Result<Batch> {
        self.insert(name, tensor)?;
        Ok(self)
    }

    pub fn with_meta(mut self, meta: Value) -> Batch {
        self.meta = Some(meta);
        self
    }

    pub fn get(&self, name: &str) -> Result<&Tensor> {
        self.fields.get(name).ok_or_else(|| TrainError::MissingField(name.to_string()))
    }

    pub fn input(&self) -> Result<&Tensor> {
        self.get(INPUT)
    }

    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.fields.iter()
    }

    /// Number of examples (leading dimension shared by every field).
    pub fn len(&self) -> usize {
        self.fields.values().next().map_or(0, Tensor::rows)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves every tensor field to `device`; `meta` stays where it is.
    pub fn to_device(&mut self, device: Device) {
        for tensor in self.fields.values_mut() {
            if tensor.device() != device {
                *tensor = std::mem::take(tensor).into_device(device);
            }
        }
    }

    /// Example identifiers from `meta.ids`, rendered as strings.
    pub fn meta_ids(&self) -> Option<Vec<String>> {
        let ids = self.meta.as_ref()?.get("ids")?.as_array()?;
        Some(ids.iter()
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect())
    }

    /// Splits the batch along the leading dimension into consecutive chunks.
    /// `meta.ids` is split alongside; any other meta is copied into every chunk.
    pub fn split(&self, chunk_sizes: &[usize]) -> Result<Vec<Batch>> {
        let total: usize = chunk_sizes.iter().sum();
        if total != self.len() {
            return Err(TrainError::Shape(format!(
                "chunk sizes sum to {total} but batch has {} examples",
                self.len()
            )));
        }

        let mut chunks = Vec::with_capacity(chunk_sizes.len());
        let mut start = 0;
        for &size in chunk_sizes {
            let end = start + size;
            let fields = self.fields.iter()
                .map(|(k, t)| (k.clone(), Tensor::on(t.data().slice_rows(start, end), t.device())))
                .collect();
            let meta = self.meta.as_ref().map(|m| slice_meta(m, start, end));
            chunks.push(Batch { fields, meta });
            start = end;
        }
        Ok(chunks)
    }
}

fn slice_meta(meta: &Value, start: usize, end: usize) -> Value {
    let mut meta = meta.clone();
    if let Some(Value::Array(ids)) = meta.get_mut("ids") {
        if end <= ids.len() {
            *ids = ids[start..end].to_vec();
        }
    }
    meta
}
