use std::{
	fs, io,
	path::{Path, PathBuf}
};

/// Locates texture data given a logical texture path such as `brick/brickwall001`.
pub trait ContentProvider {
	/// Read a texture's encoded bytes. `Ok(None)` means the texture could not be found.
	fn find_texture(&self, texture_path: &str) -> io::Result<Option<Vec<u8>>>;
}

/// Normalise a logical texture path: forward slashes, no leading `materials/`, no `.vtf` extension.
pub fn normalize_texture_path(texture_path: &str) -> String {
	let path = texture_path.trim().replace('\\', "/");
	let mut path = path.trim_start_matches('/');

	if path.get(..10).is_some_and(|x| x.eq_ignore_ascii_case("materials/")) {
		path = &path[10..];
	}

	if let Some(stem_len) = path.len().checked_sub(4) {
		if path.get(stem_len..).is_some_and(|x| x.eq_ignore_ascii_case(".vtf")) {
			path = &path[..stem_len];
		}
	}

	path.to_owned()
}

/// Searches a list of game/mod directories for `materials/<path>.vtf`, in order.
#[derive(Clone, Debug, Default)]
pub struct DirectoryContent {
	roots: Vec<PathBuf>
}

impl DirectoryContent {
	pub fn new<I, P>(roots: I) -> Self
	where
		I: IntoIterator<Item = P>,
		P: Into<PathBuf>
	{
		Self {
			roots: roots.into_iter().map(Into::into).collect()
		}
	}

	pub fn add_root(&mut self, root: impl Into<PathBuf>) {
		self.roots.push(root.into());
	}

	fn locate(&self, texture_path: &str) -> Option<PathBuf> {
		let normalized = normalize_texture_path(texture_path);
		let lowercase = normalized.to_lowercase();

		self.roots.iter().find_map(|root| {
			[&normalized, &lowercase]
				.into_iter()
				.map(|candidate| texture_file(root, candidate))
				.find(|path| path.is_file())
		})
	}
}

fn texture_file(root: &Path, texture_path: &str) -> PathBuf {
	root.join("materials").join(format!("{texture_path}.vtf"))
}

impl ContentProvider for DirectoryContent {
	fn find_texture(&self, texture_path: &str) -> io::Result<Option<Vec<u8>>> {
		let Some(path) = self.locate(texture_path) else {
			return Ok(None);
		};

		tracing::debug!("Resolved texture {texture_path} to {}", path.display());

		fs::read(path).map(Some)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalizes_paths() {
		assert_eq!(normalize_texture_path("brick/brickwall001"), "brick/brickwall001");
		assert_eq!(normalize_texture_path("Materials\\Brick\\Wall.VTF"), "Brick/Wall");
		assert_eq!(normalize_texture_path("/materials/metal/fence.vtf "), "metal/fence");
		assert_eq!(normalize_texture_path("vtf"), "vtf");
	}

	#[test]
	fn searches_roots_in_order() {
		let first = tempfile::tempdir().unwrap();
		let second = tempfile::tempdir().unwrap();

		fs::create_dir_all(first.path().join("materials/metal")).unwrap();
		fs::create_dir_all(second.path().join("materials/metal")).unwrap();
		fs::create_dir_all(second.path().join("materials/brick")).unwrap();
		fs::write(first.path().join("materials/metal/fence.vtf"), b"first").unwrap();
		fs::write(second.path().join("materials/metal/fence.vtf"), b"second").unwrap();
		fs::write(second.path().join("materials/brick/wall.vtf"), b"wall").unwrap();

		let content = DirectoryContent::new([first.path(), second.path()]);

		assert_eq!(content.find_texture("metal/fence").unwrap(), Some(b"first".to_vec()));
		assert_eq!(content.find_texture("materials/brick/wall.vtf").unwrap(), Some(b"wall".to_vec()));
		assert_eq!(content.find_texture("brick/missing").unwrap(), None);
	}

	#[test]
	fn falls_back_to_lowercase() {
		let root = tempfile::tempdir().unwrap();
		fs::create_dir_all(root.path().join("materials/brick")).unwrap();
		fs::write(root.path().join("materials/brick/wall.vtf"), b"wall").unwrap();

		let mut content = DirectoryContent::default();
		content.add_root(root.path());

		assert_eq!(content.find_texture("Brick/Wall").unwrap(), Some(b"wall".to_vec()));
	}
}
