use indexmap::IndexMap;
use thiserror::Error;
use tryvial::try_fn;

use crate::kv::{self, KvError, KvValue};

type Result<T, E = VmtError> = std::result::Result<T, E>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmtError {
	#[error("syntax error: {0}")]
	Syntax(#[from] KvError),

	#[error("material definition is empty")]
	Empty,

	#[error("shader {0} has no parameter block")]
	ShaderNotBlock(String)
}

/// A parsed Source material definition (VMT).
#[derive(Clone, Debug, PartialEq)]
pub struct Vmt {
	/// The shader name as written in the file, e.g. `VertexLitGeneric`.
	pub shader: String,

	/// Material parameters. Keys are lower-cased (Source treats them case-insensitively); values are left untouched.
	pub material: IndexMap<String, KvValue>
}

impl Vmt {
	/// Parse a VMT from its text.
	#[try_fn]
	pub fn parse(text: &str) -> Result<Self> {
		let root = kv::parse(text)?;

		let (shader, params) = root.into_iter().next().ok_or(VmtError::Empty)?;

		let KvValue::Block(params) = params else {
			return Err(VmtError::ShaderNotBlock(shader));
		};

		Self {
			shader,
			material: lowercase_keys(params)
		}
	}

	pub fn get(&self, key: &str) -> Option<&KvValue> {
		self.material.get(&key.to_ascii_lowercase())
	}

	/// A non-empty string parameter.
	pub fn get_string(&self, key: &str) -> Option<&str> {
		self.get(key).and_then(KvValue::as_str).map(str::trim).filter(|x| !x.is_empty())
	}

	pub fn get_int(&self, key: &str) -> Option<i64> {
		self.get(key).and_then(KvValue::as_i64)
	}

	pub fn get_float(&self, key: &str) -> Option<f64> {
		self.get(key).and_then(KvValue::as_f64)
	}

	/// Flags are set when present and non-zero.
	pub fn get_bool(&self, key: &str) -> bool {
		self.get_int(key).is_some_and(|x| x != 0)
	}

	/// A vector parameter.
	///
	/// `[1 0.5 0]` is read as floats, `{255 128 0}` as bytes scaled to 0..1 and a bare number as a single component.
	pub fn get_vector(&self, key: &str) -> Option<Vec<f64>> {
		let value = self.get_string(key)?;

		let (inner, scale) = if let Some(inner) = value.strip_prefix('[').and_then(|x| x.strip_suffix(']')) {
			(inner, 1.0)
		} else if let Some(inner) = value.strip_prefix('{').and_then(|x| x.strip_suffix('}')) {
			(inner, 255.0)
		} else {
			(value, 1.0)
		};

		let components = inner
			.split_whitespace()
			.map(|x| x.parse::<f64>().map(|x| x / scale))
			.collect::<Result<Vec<_>, _>>()
			.ok()?;

		(!components.is_empty()).then_some(components)
	}
}

fn lowercase_keys(block: IndexMap<String, KvValue>) -> IndexMap<String, KvValue> {
	block
		.into_iter()
		.map(|(key, value)| {
			let value = match value {
				KvValue::Block(inner) => KvValue::Block(lowercase_keys(inner)),
				value => value
			};

			(key.to_ascii_lowercase(), value)
		})
		.collect()
}
