use image::{Rgba, RgbaImage};
use indexmap::IndexMap;
use tryvial::try_fn;

use crate::{
	content::{normalize_texture_path, ContentProvider},
	converter::ConvertError
};

type Result<T, E = ConvertError> = std::result::Result<T, E>;

/// Turns encoded texture data into an RGBA8 image.
pub trait TextureDecoder {
	/// `Ok(None)` means the decoder did not accept the buffer at all; errors are failures after it was accepted.
	fn decode(&self, data: &[u8]) -> Result<Option<RgbaImage>>;
}

/// Decodes Valve Texture Format files using the highest resolution mip level.
#[cfg(feature = "vtf")]
#[derive(Clone, Copy, Debug, Default)]
pub struct VtfDecoder;

#[cfg(feature = "vtf")]
impl TextureDecoder for VtfDecoder {
	#[try_fn]
	fn decode(&self, data: &[u8]) -> Result<Option<RgbaImage>> {
		let data = data.to_vec();
		let vtf = match vtf::from_bytes(&data) {
			Ok(vtf) => vtf,
			Err(error) => {
				tracing::debug!("Rejected texture buffer: {error}");
				return Ok(None);
			}
		};

		let decoded = vtf
			.highres_image
			.decode(0)
			.map_err(|error| ConvertError::Decode(error.to_string()))?
			.into_rgba8();

		let (width, height) = (decoded.width(), decoded.height());

		// Rebuilt from raw bytes so the vtf crate's image version does not leak into ours
		Some(
			RgbaImage::from_raw(width, height, decoded.into_raw())
				.ok_or_else(|| ConvertError::Decode(format!("pixel buffer does not match {width}x{height}")))?
		)
	}
}

/// Resolves and decodes textures for one material, remembering every result.
///
/// A texture referenced by several parameters (or a missing one referenced twice) is only read and decoded once.
pub struct TextureLoader<'a> {
	content: &'a dyn ContentProvider,
	decoder: &'a dyn TextureDecoder,
	cache: IndexMap<String, Option<RgbaImage>>
}

impl<'a> TextureLoader<'a> {
	pub fn new(content: &'a dyn ContentProvider, decoder: &'a dyn TextureDecoder) -> Self {
		Self {
			content,
			decoder,
			cache: IndexMap::new()
		}
	}

	/// Load a texture by its logical path. Missing or rejected textures are logged and give `None`.
	#[try_fn]
	pub fn load(&mut self, texture_path: &str) -> Result<Option<RgbaImage>> {
		let key = normalize_texture_path(texture_path).to_lowercase();

		if let Some(cached) = self.cache.get(&key) {
			tracing::debug!("Texture {texture_path} already loaded");

			if cached.is_none() {
				tracing::error!("Texture {texture_path} not found!");
			}

			return Ok(cached.clone());
		}

		tracing::info!("Loading texture {texture_path}");

		let texture = match self.content.find_texture(texture_path)? {
			Some(data) => self.decoder.decode(&data)?,
			None => None
		};

		if texture.is_none() {
			tracing::error!("Texture {texture_path} not found!");
		}

		self.cache.insert(key, texture.clone());

		texture
	}

	/// Number of distinct texture paths requested so far.
	pub fn cached(&self) -> usize {
		self.cache.len()
	}
}

/// Greyscale image of the alpha channel, fully opaque.
pub fn alpha_to_mask(image: &RgbaImage) -> RgbaImage {
	RgbaImage::from_fn(image.width(), image.height(), |x, y| {
		let alpha = image.get_pixel(x, y)[3];
		Rgba([alpha, alpha, alpha, 255])
	})
}

/// Invert the colour channels, keeping alpha.
pub fn invert_mask(image: &RgbaImage) -> RgbaImage {
	RgbaImage::from_fn(image.width(), image.height(), |x, y| {
		let [r, g, b, a] = image.get_pixel(x, y).0;
		Rgba([255 - r, 255 - g, 255 - b, a])
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{count_errors, CountingDecoder, MemoryContent};

	#[test]
	fn missing_texture_logs_one_error() {
		let content = MemoryContent::default();
		let decoder = CountingDecoder::default();
		let mut loader = TextureLoader::new(&content, &decoder);

		let (result, errors) = count_errors(|| loader.load("brick/missing").unwrap());

		assert!(result.is_none());
		assert_eq!(errors, 1);
		assert_eq!(decoder.calls(), 0);
	}

	#[test]
	fn rejected_buffer_is_not_found() {
		let content = MemoryContent::default().with("brick/wall", CountingDecoder::REJECT.to_vec());
		let decoder = CountingDecoder::default();
		let mut loader = TextureLoader::new(&content, &decoder);

		let (result, errors) = count_errors(|| loader.load("brick/wall").unwrap());

		assert!(result.is_none());
		assert_eq!(errors, 1);
	}

	#[test]
	fn decode_failure_propagates() {
		let content = MemoryContent::default().with("brick/wall", CountingDecoder::CORRUPT.to_vec());
		let decoder = CountingDecoder::default();
		let mut loader = TextureLoader::new(&content, &decoder);

		assert!(matches!(loader.load("brick/wall"), Err(ConvertError::Decode(_))));
	}

	#[test]
	fn repeated_loads_decode_once() {
		let content = MemoryContent::default().with("brick/wall", vec![4, 2, 128]);
		let decoder = CountingDecoder::default();
		let mut loader = TextureLoader::new(&content, &decoder);

		let first = loader.load("brick/wall").unwrap().unwrap();
		let second = loader.load("Materials/Brick/Wall.vtf").unwrap().unwrap();

		assert_eq!(first, second);
		assert_eq!(first.dimensions(), (4, 2));
		assert_eq!(decoder.calls(), 1);
		assert_eq!(loader.cached(), 1);
	}

	#[test]
	fn channel_helpers() {
		let image = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 200]));

		let mask = alpha_to_mask(&image);
		assert_eq!(mask.get_pixel(1, 1), &Rgba([200, 200, 200, 255]));
		assert_eq!(invert_mask(&mask).get_pixel(0, 0), &Rgba([55, 55, 55, 255]));
	}

	#[cfg(feature = "vtf")]
	#[test]
	fn vtf_decoder_rejects_other_formats() {
		assert_eq!(VtfDecoder.decode(b"not a valve texture").unwrap(), None);
		assert_eq!(VtfDecoder.decode(&[]).unwrap(), None);
	}

	#[cfg(feature = "vtf")]
	#[test]
	fn vtf_decoder_reads_highest_mip() {
		let source = RgbaImage::from_fn(4, 2, |x, y| Rgba([x as u8 * 60, y as u8 * 100, 7, 128]));
		let data = vtf::create(image::DynamicImage::ImageRgba8(source.clone()), vtf::ImageFormat::Rgba8888).unwrap();

		let decoded = VtfDecoder.decode(&data).unwrap().unwrap();

		assert_eq!(decoded.dimensions(), (4, 2));
		assert_eq!(decoded, source);
	}
}
