use std::{
	fs::{self, File},
	io::{BufWriter, Write},
	path::{Path, PathBuf}
};

use image::{ImageFormat, RgbaImage};
use indexmap::IndexMap;
use thiserror::Error;
use tryvial::try_fn;

use crate::{
	kv::{self, KvValue, KvWriter},
	texture::TextureLoader,
	vmt::Vmt
};

type Result<T, E = ConvertError> = std::result::Result<T, E>;

/// First line of every generated material.
pub const GENERATOR_COMMENT: &str = "// Generated by Source2Converter";

pub const DEFAULT_SHADER: &str = "vr_complex.vfx";

/// Suffix for textures whose role is not known.
pub const DEFAULT_TEXTURE_SUFFIX: &str = "unk";

const TEXTURE_EXTENSION: &str = "tga";

#[derive(Error, Debug)]
pub enum ConvertError {
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("image error: {0}")]
	Image(#[from] image::ImageError),

	#[error("texture decode failed: {0}")]
	Decode(String),

	#[error("conversion is not implemented for shader {0}")]
	NotImplemented(String),

	#[error("unsupported shader: {0}")]
	UnsupportedShader(String),

	#[error("output path escapes the output root: {0}")]
	StripPrefix(#[from] std::path::StripPrefixError)
}

/// Parameters of the generated material's `Layer0` block.
///
/// `shader` and `F_MORPH_SUPPORTED` are always written first; shader-specific parameters follow in insertion order.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct VmatParams {
	/// Source 2 shader file. Defaults to `vr_complex.vfx`.
	pub shader: String,

	/// Written as `F_MORPH_SUPPORTED`. Defaults to enabled.
	pub morph_supported: bool,

	#[cfg_attr(feature = "serde", serde(default))]
	pub extra: IndexMap<String, KvValue>
}

impl Default for VmatParams {
	fn default() -> Self {
		Self::new(DEFAULT_SHADER)
	}
}

impl VmatParams {
	pub fn new(shader: impl Into<String>) -> Self {
		Self {
			shader: shader.into(),
			morph_supported: true,
			extra: IndexMap::new()
		}
	}

	/// Set a shader-specific parameter, returning the previous value.
	pub fn set(&mut self, key: impl Into<String>, value: impl Into<KvValue>) -> Option<KvValue> {
		self.extra.insert(key.into(), value.into())
	}

	pub fn get(&self, key: &str) -> Option<&KvValue> {
		self.extra.get(key)
	}

	pub fn remove(&mut self, key: &str) -> Option<KvValue> {
		self.extra.shift_remove(key)
	}

	/// The full property mapping as handed to the KeyValues writer.
	pub fn to_kv(&self) -> IndexMap<String, KvValue> {
		let mut params = IndexMap::with_capacity(self.extra.len() + 2);

		params.insert("shader".to_owned(), KvValue::from(self.shader.as_str()));
		params.insert("F_MORPH_SUPPORTED".to_owned(), KvValue::from(self.morph_supported));

		for (key, value) in &self.extra {
			params.insert(key.to_owned(), value.to_owned());
		}

		params
	}
}

/// The result of converting one material.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct ConvertedMaterial {
	pub vmat_path: PathBuf,
	pub params: VmatParams,

	/// Texture suffix to the written texture's path, relative to the output root.
	pub textures: IndexMap<String, String>
}

/// Converts one Source material into a Source 2 material.
pub trait ShaderConverter {
	/// Fill in the material parameters, write every texture and the material itself.
	fn convert(&mut self) -> Result<ConvertedMaterial>;
}

/// State and shared utilities for converting a single material.
///
/// Shader-specific converters wrap this and implement [`ShaderConverter`]; the base itself cannot convert anything.
pub struct MaterialConverter<'a> {
	pub name: String,
	pub sub_path: String,

	/// Decoded textures by role (`color`, `normal`, ...).
	pub textures: IndexMap<String, RgbaImage>,

	pub params: VmatParams,

	vmt: &'a Vmt,
	output_root: PathBuf,
	loader: TextureLoader<'a>,
	written: IndexMap<String, String>
}

impl<'a> MaterialConverter<'a> {
	pub fn new(
		name: impl Into<String>,
		sub_path: impl Into<String>,
		vmt: &'a Vmt,
		output_root: impl Into<PathBuf>,
		loader: TextureLoader<'a>
	) -> Self {
		Self {
			name: name.into(),
			sub_path: sub_path.into(),
			textures: IndexMap::new(),
			params: VmatParams::default(),
			vmt,
			output_root: output_root.into(),
			loader,
			written: IndexMap::new()
		}
	}

	pub fn vmt(&self) -> &'a Vmt {
		self.vmt
	}

	pub fn output_root(&self) -> &Path {
		&self.output_root
	}

	/// `<output root>/materials/<sub path>`
	pub fn material_dir(&self) -> PathBuf {
		self.output_root.join("materials").join(&self.sub_path)
	}

	pub fn vmat_path(&self) -> PathBuf {
		self.material_dir().join(format!("{}.vmat", self.name))
	}

	pub fn texture_path(&self, suffix: &str) -> PathBuf {
		self.material_dir()
			.join(format!("{}_{suffix}.{TEXTURE_EXTENSION}", self.name))
	}

	/// Write the material file, replacing any existing one.
	#[try_fn]
	pub fn write_vmat(&self) -> Result<PathBuf> {
		let path = self.vmat_path();

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}

		let mut file = BufWriter::new(File::create(&path)?);
		file.write_all(GENERATOR_COMMENT.as_bytes())?;
		file.write_all(b"\r\n")?;

		let mut writer = KvWriter::new(file);
		writer.write_block("Layer0", &self.params.to_kv())?;
		writer.into_inner().flush()?;

		tracing::info!("Wrote material to {}", path.display());

		path
	}

	/// Resolve and decode a texture. A missing texture is logged and gives `None`.
	#[try_fn]
	pub fn load_texture(&mut self, texture_path: &str) -> Result<Option<RgbaImage>> {
		self.loader.load(texture_path)?
	}

	/// Write a texture as `<name>_<suffix>.tga` next to the material, plus an optional settings side-car with the same
	/// stem. Returns the texture's path relative to the output root with forward slashes.
	#[try_fn]
	pub fn write_texture(
		&mut self,
		image: &RgbaImage,
		suffix: &str,
		settings: Option<&IndexMap<String, KvValue>>
	) -> Result<String> {
		fs::create_dir_all(self.material_dir())?;

		let path = self.texture_path(suffix);
		image.save_with_format(&path, ImageFormat::Tga)?;
		tracing::info!("Wrote texture to {}", path.display());

		if let Some(settings) = settings {
			Self::write_settings(&path.with_extension("txt"), settings)?;
		}

		let relative = path
			.strip_prefix(&self.output_root)?
			.components()
			.map(|x| x.as_os_str().to_string_lossy())
			.collect::<Vec<_>>()
			.join("/");

		self.written.insert(suffix.to_owned(), relative.to_owned());

		relative
	}

	/// Write a texture compile settings block to `path`.
	#[try_fn]
	pub fn write_settings(path: &Path, props: &IndexMap<String, KvValue>) -> Result<()> {
		let mut file = BufWriter::new(File::create(path)?);
		kv::write_settings(&mut file, props)?;
		file.flush()?;
	}

	/// Snapshot of what has been produced so far.
	pub fn converted(&self, vmat_path: PathBuf) -> ConvertedMaterial {
		ConvertedMaterial {
			vmat_path,
			params: self.params.to_owned(),
			textures: self.written.to_owned()
		}
	}
}

impl ShaderConverter for MaterialConverter<'_> {
	fn convert(&mut self) -> Result<ConvertedMaterial> {
		Err(ConvertError::NotImplemented(self.vmt.shader.to_owned()))
	}
}

/// Pad with `filler` or truncate so that exactly `length` values remain.
pub fn ensure_length<T: Clone>(mut values: Vec<T>, length: usize, filler: T) -> Vec<T> {
	values.resize(length, filler);
	values
}
