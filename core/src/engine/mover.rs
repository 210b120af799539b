use std::{
	fs,
	io::{self, Read, Write},
	path::{Path, PathBuf},
	time::SystemTime,
};

use filetime::FileTime;
use tracing::debug;

use super::LifecycleError;

const CHUNK_SIZE: usize = 256 * 1024; // 256KB

/// Where the archived copy of `original` lives: `archive_root/basename`.
pub(crate) fn archive_path(archive_root: &Path, original: &Path) -> Result<PathBuf, LifecycleError> {
	original
		.file_name()
		.map(|name| archive_root.join(name))
		.ok_or_else(|| LifecycleError::Io(format!("{}: path has no file name", original.display())))
}

/// Move `source` to `dest` without ever replacing an existing `dest`.
///
/// A rename across filesystems falls back to copy, verify, then remove.
pub(crate) fn move_file(source: &Path, dest: &Path) -> Result<(), LifecycleError> {
	if fs::symlink_metadata(dest).is_ok() {
		return Err(LifecycleError::TargetExists(dest.display().to_string()));
	}

	match fs::rename(source, dest) {
		Ok(()) => Ok(()),
		Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
			debug!(source = %source.display(), dest = %dest.display(), "rename crosses devices, copying");
			copy_across_devices(source, dest)
		}
		Err(err) if err.kind() == io::ErrorKind::NotFound => {
			Err(LifecycleError::SourceMissing(source.display().to_string()))
		}
		Err(err) => Err(map_io_error(err, source)),
	}
}

/// Remove a file, treating "already gone" as success.
/// Returns whether a file was actually removed.
pub(crate) fn remove_if_present(path: &Path) -> Result<bool, LifecycleError> {
	match fs::remove_file(path) {
		Ok(()) => Ok(true),
		Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
		Err(err) => Err(map_io_error(err, path)),
	}
}

/// Set a file's modification time.
pub(crate) fn touch(path: &Path, at: SystemTime) -> Result<(), LifecycleError> {
	filetime::set_file_mtime(path, FileTime::from_system_time(at)).map_err(|e| map_io_error(e, path))
}

/// Copy → hash → verify → remove source. Keeps the source mtime.
fn copy_across_devices(source_path: &Path, dest_path: &Path) -> Result<(), LifecycleError> {
	let metadata = fs::metadata(source_path).map_err(|e| map_io_error(e, source_path))?;
	let mut source = fs::File::open(source_path).map_err(|e| map_io_error(e, source_path))?;
	let mut dest = fs::File::options()
		.write(true)
		.create_new(true)
		.open(dest_path)
		.map_err(|e| map_io_error(e, dest_path))?;

	// Single-pass: read → hash → write
	let mut hasher = blake3::Hasher::new();
	let mut buf = vec![0u8; CHUNK_SIZE];
	let copied = (|| -> io::Result<()> {
		loop {
			let n = source.read(&mut buf)?;
			if n == 0 {
				break;
			}
			hasher.update(&buf[..n]);
			dest.write_all(&buf[..n])?;
		}
		dest.flush()?;
		dest.sync_all()
	})();
	drop(dest);

	if let Err(err) = copied {
		let _ = fs::remove_file(dest_path);
		return Err(map_io_error(err, dest_path));
	}

	let source_hash = hasher.finalize().to_hex().to_string();
	let dest_hash = hash_file(dest_path)?;
	if source_hash != dest_hash {
		let _ = fs::remove_file(dest_path);
		return Err(LifecycleError::CopyMismatch {
			path: source_path.display().to_string(),
			source_hash,
			dest_hash,
		});
	}

	if let Ok(modified) = metadata.modified() {
		let _ = touch(dest_path, modified);
	}
	fs::remove_file(source_path).map_err(|e| map_io_error(e, source_path))
}

/// Hash a file using blake3 in 256KB chunks.
pub(crate) fn hash_file(path: &Path) -> Result<String, LifecycleError> {
	let mut file = fs::File::open(path).map_err(|e| map_io_error(e, path))?;
	let mut hasher = blake3::Hasher::new();
	let mut buf = vec![0u8; CHUNK_SIZE];

	loop {
		let n = file.read(&mut buf).map_err(|e| map_io_error(e, path))?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
	}

	Ok(hasher.finalize().to_hex().to_string())
}

pub(crate) fn map_io_error(err: io::Error, path: &Path) -> LifecycleError {
	let path_str = path.display().to_string();
	match err.kind() {
		io::ErrorKind::NotFound => LifecycleError::SourceMissing(path_str),
		io::ErrorKind::PermissionDenied => LifecycleError::PermissionDenied(path_str),
		io::ErrorKind::AlreadyExists => LifecycleError::TargetExists(path_str),
		io::ErrorKind::StorageFull => LifecycleError::DiskFull(path_str),
		_ => LifecycleError::Io(format!("{path_str}: {err}")),
	}
}
