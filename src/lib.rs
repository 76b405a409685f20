//! Conversion of Source engine materials (VMT) and textures (VTF) to Source 2 materials (VMAT) and TGA textures.

pub mod content;
pub mod converter;
pub mod kv;
pub mod shaders;
pub mod texture;
pub mod vmt;

#[cfg(test)]
mod test_support;

pub use content::{ContentProvider, DirectoryContent};
pub use converter::{
	ensure_length, ConvertError, ConvertedMaterial, MaterialConverter, ShaderConverter, VmatParams
};
pub use shaders::{convert_material, ShaderFamily};
#[cfg(feature = "vtf")]
pub use texture::VtfDecoder;
pub use texture::{TextureDecoder, TextureLoader};
pub use vmt::Vmt;
