//! Fakes shared by the unit tests.

use std::{
	cell::Cell,
	io,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc
	}
};

use image::{Rgba, RgbaImage};
use indexmap::IndexMap;
use tracing::{
	span::{Attributes, Id, Record},
	Event, Level, Metadata, Subscriber
};

use crate::{
	content::{normalize_texture_path, ContentProvider},
	converter::ConvertError,
	texture::TextureDecoder
};

/// Textures held in memory, keyed by normalised lower-case path.
#[derive(Default)]
pub struct MemoryContent {
	files: IndexMap<String, Vec<u8>>
}

impl MemoryContent {
	pub fn with(mut self, texture_path: &str, data: Vec<u8>) -> Self {
		self.files.insert(normalize_texture_path(texture_path).to_lowercase(), data);
		self
	}
}

impl ContentProvider for MemoryContent {
	fn find_texture(&self, texture_path: &str) -> io::Result<Option<Vec<u8>>> {
		Ok(self
			.files
			.get(&normalize_texture_path(texture_path).to_lowercase())
			.cloned())
	}
}

/// Decodes `[width, height, alpha]` into a solid `(10, 20, 30, alpha)` image and counts calls.
#[derive(Default)]
pub struct CountingDecoder {
	calls: Cell<usize>
}

impl CountingDecoder {
	pub const REJECT: &'static [u8] = b"reject";
	pub const CORRUPT: &'static [u8] = b"corrupt";

	pub fn calls(&self) -> usize {
		self.calls.get()
	}
}

impl TextureDecoder for CountingDecoder {
	fn decode(&self, data: &[u8]) -> Result<Option<RgbaImage>, ConvertError> {
		self.calls.set(self.calls.get() + 1);

		match data {
			Self::REJECT => Ok(None),
			&[width, height, alpha] => Ok(Some(RgbaImage::from_pixel(
				width.into(),
				height.into(),
				Rgba([10, 20, 30, alpha])
			))),
			_ => Err(ConvertError::Decode("corrupt texture".into()))
		}
	}
}

struct ErrorCounter(Arc<AtomicUsize>);

impl Subscriber for ErrorCounter {
	fn enabled(&self, _: &Metadata<'_>) -> bool {
		true
	}

	fn new_span(&self, _: &Attributes<'_>) -> Id {
		Id::from_u64(1)
	}

	fn record(&self, _: &Id, _: &Record<'_>) {}

	fn record_follows_from(&self, _: &Id, _: &Id) {}

	fn event(&self, event: &Event<'_>) {
		if *event.metadata().level() == Level::ERROR {
			self.0.fetch_add(1, Ordering::SeqCst);
		}
	}

	fn enter(&self, _: &Id) {}

	fn exit(&self, _: &Id) {}
}

/// Run `f` and count the error-level events it emits on this thread.
pub fn count_errors<R>(f: impl FnOnce() -> R) -> (R, usize) {
	let errors = Arc::new(AtomicUsize::new(0));
	let result = tracing::subscriber::with_default(ErrorCounter(errors.clone()), f);

	(result, errors.load(Ordering::SeqCst))
}
