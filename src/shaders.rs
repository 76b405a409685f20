use std::{path::PathBuf, str::FromStr};

use indexmap::IndexMap;
use tryvial::try_fn;

use crate::{
	converter::{ensure_length, ConvertError, ConvertedMaterial, MaterialConverter, ShaderConverter},
	kv::KvValue,
	texture::{alpha_to_mask, invert_mask, TextureLoader},
	vmt::Vmt
};

type Result<T, E = ConvertError> = std::result::Result<T, E>;

pub const UNLIT_SHADER: &str = "vr_unlit.vfx";

/// Source shaders that can be converted.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(strum::EnumString, strum::Display, PartialEq, Eq, Hash, Clone, Copy, Debug)]
#[strum(ascii_case_insensitive)]
pub enum ShaderFamily {
	LightmappedGeneric,
	VertexLitGeneric,

	/// Only the first blend layer is converted.
	WorldVertexTransition,

	UnlitGeneric
}

impl ShaderFamily {
	pub fn converter<'a>(self, base: MaterialConverter<'a>) -> Box<dyn ShaderConverter + 'a> {
		match self {
			Self::LightmappedGeneric | Self::VertexLitGeneric | Self::WorldVertexTransition => {
				Box::new(GenericConverter::new(base))
			}

			Self::UnlitGeneric => Box::new(UnlitGenericConverter::new(base))
		}
	}
}

/// Convert a material with the converter matching its shader.
#[tracing::instrument(skip_all, fields(material = %name, sub_path = %sub_path, shader = %vmt.shader))]
pub fn convert_material<'a>(
	name: &str,
	sub_path: &str,
	vmt: &'a Vmt,
	output_root: impl Into<PathBuf>,
	loader: TextureLoader<'a>
) -> Result<ConvertedMaterial> {
	let family =
		ShaderFamily::from_str(&vmt.shader).map_err(|_| ConvertError::UnsupportedShader(vmt.shader.to_owned()))?;

	family
		.converter(MaterialConverter::new(name, sub_path, vmt, output_root, loader))
		.convert()
}

/// Lit geometry (`LightmappedGeneric`, `VertexLitGeneric`) to `vr_complex.vfx`.
pub struct GenericConverter<'a> {
	base: MaterialConverter<'a>
}

impl<'a> GenericConverter<'a> {
	pub fn new(base: MaterialConverter<'a>) -> Self {
		Self { base }
	}
}

impl ShaderConverter for GenericConverter<'_> {
	fn convert(&mut self) -> Result<ConvertedMaterial> {
		let base = &mut self.base;

		convert_base_texture(base)?;
		convert_color_tint(base);
		convert_normal_map(base)?;
		convert_roughness(base)?;
		convert_self_illum(base)?;
		convert_surface_prop(base);

		let vmat_path = base.write_vmat()?;
		Ok(base.converted(vmat_path))
	}
}

/// `UnlitGeneric` to `vr_unlit.vfx`.
pub struct UnlitGenericConverter<'a> {
	base: MaterialConverter<'a>
}

impl<'a> UnlitGenericConverter<'a> {
	pub fn new(base: MaterialConverter<'a>) -> Self {
		Self { base }
	}
}

impl ShaderConverter for UnlitGenericConverter<'_> {
	fn convert(&mut self) -> Result<ConvertedMaterial> {
		let base = &mut self.base;
		base.params.shader = UNLIT_SHADER.to_owned();

		convert_base_texture(base)?;
		convert_color_tint(base);

		let vmat_path = base.write_vmat()?;
		Ok(base.converted(vmat_path))
	}
}

/// `$basetexture`, plus its alpha as a translucency mask when the material is translucent or alpha tested.
#[try_fn]
fn convert_base_texture(base: &mut MaterialConverter<'_>) -> Result<()> {
	let vmt = base.vmt();

	let Some(texture_path) = vmt.get_string("$basetexture") else {
		return Ok(());
	};

	let Some(texture) = base.load_texture(texture_path)? else {
		return Ok(());
	};

	let color = base.write_texture(&texture, "color", None)?;
	base.params.set("TextureColor", color);

	let alpha_test = vmt.get_bool("$alphatest");
	if alpha_test || vmt.get_bool("$translucent") {
		let mask = alpha_to_mask(&texture);
		let translucency = base.write_texture(&mask, "trans", None)?;
		base.params.set("TextureTranslucency", translucency);
		base.textures.insert("trans".into(), mask);

		if alpha_test {
			base.params.set("F_ALPHA_TEST", 1);

			if let Some(reference) = vmt.get_float("$alphatestreference") {
				base.params.set("g_flAlphaTestReference", reference);
			}
		} else {
			base.params.set("F_TRANSLUCENT", 1);
		}
	}

	base.textures.insert("color".into(), texture);
}

fn convert_color_tint(base: &mut MaterialConverter<'_>) {
	let vmt = base.vmt();

	let Some(color) = vmt.get_vector("$color").or_else(|| vmt.get_vector("$color2")) else {
		return;
	};

	let mut tint = if color.len() == 1 {
		vec![color[0]; 3]
	} else {
		ensure_length(color, 3, 1.0)
	};

	tint.push(0.0);
	base.params.set("g_vColorTint", tint);
}

#[try_fn]
fn convert_normal_map(base: &mut MaterialConverter<'_>) -> Result<()> {
	let vmt = base.vmt();

	let Some(texture_path) = vmt.get_string("$bumpmap").or_else(|| vmt.get_string("$normalmap")) else {
		return Ok(());
	};

	let Some(normal) = base.load_texture(texture_path)? else {
		return Ok(());
	};

	// Source normal maps have green pointing down
	let mut settings = IndexMap::new();
	settings.insert("legacy_source1_inverted_normal".to_owned(), KvValue::Int(1));

	let path = base.write_texture(&normal, "normal", Some(&settings))?;
	base.params.set("TextureNormal", path);
	base.textures.insert("normal".into(), normal);
}

/// Phong masks are glossiness, so roughness is the inverted mask.
#[try_fn]
fn convert_roughness(base: &mut MaterialConverter<'_>) -> Result<()> {
	let vmt = base.vmt();

	if !vmt.get_bool("$phong") {
		return Ok(());
	}

	let mask_role = if vmt.get_bool("$basemapalphaphongmask") { "color" } else { "normal" };

	let Some(roughness) = base
		.textures
		.get(mask_role)
		.map(|source| invert_mask(&alpha_to_mask(source)))
	else {
		return Ok(());
	};

	let path = base.write_texture(&roughness, "rough", None)?;
	base.params.set("TextureRoughness", path);
	base.textures.insert("rough".into(), roughness);
}

#[try_fn]
fn convert_self_illum(base: &mut MaterialConverter<'_>) -> Result<()> {
	let vmt = base.vmt();

	if !vmt.get_bool("$selfillum") {
		return Ok(());
	}

	base.params.set("F_SELF_ILLUM", 1);

	let mask = match vmt.get_string("$selfillummask") {
		Some(texture_path) => base.load_texture(texture_path)?,
		None => base.textures.get("color").map(alpha_to_mask)
	};

	if let Some(mask) = mask {
		let path = base.write_texture(&mask, "selfillum", None)?;
		base.params.set("TextureSelfIllumMask", path);
		base.textures.insert("selfillum".into(), mask);
	}
}

fn convert_surface_prop(base: &mut MaterialConverter<'_>) {
	let Some(surface) = base.vmt().get_string("$surfaceprop") else {
		return;
	};

	let mut attributes = IndexMap::new();
	attributes.insert("PhysicsSurfaceProperties".to_owned(), KvValue::from(surface));

	base.params.set("SystemAttributes", attributes);
}
