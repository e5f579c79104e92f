use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufReader, Seek};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use url::Url;

use bucketfs_core::{
    ensure_contained, glob, norm_mode, norm_path, Bucket, BucketBox, CreateOptions, Error,
    FileInfo, ObjectReader, Options, Paths, Pattern, Result, Writer, DEFAULT_PERM,
};

/// A bucket backed by a directory on the local file system.
///
/// Object paths map one-to-one onto files below the root; parent directories
/// are created on demand. Content types and metadata are not persisted.
pub struct LocalBucket {
    root: PathBuf,
    perm: u16,
}

impl LocalBucket {
    /// Open a bucket rooted at `root`, which must be an existing, writable
    /// directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<LocalBucket> {
        let root = root.into();
        match writable_dir(&root) {
            Ok(root) => Ok(LocalBucket {
                root,
                perm: DEFAULT_PERM,
            }),
            Err(source) => Err(Error::InvalidRoot { path: root, source }),
        }
    }

    /// Permission bits for files created without an explicit `perm`.
    #[must_use]
    pub fn with_perm(mut self, perm: u16) -> Self {
        self.perm = norm_mode(perm.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalize a bucket path and map it below the root.
    fn file_path(&self, path: &str) -> Result<(String, PathBuf)> {
        let key = norm_path(path);
        ensure_contained(&key)?;
        let file_path = self
            .root
            .components()
            .chain(
                key.split('/')
                    .filter(|segment| !segment.is_empty())
                    .map(|segment| Component::Normal(OsStr::new(segment))),
            )
            .collect();
        Ok((key, file_path))
    }

    /// The bucket path of a file below the root, if it has a UTF-8 name.
    fn key_of(&self, file_path: &Path) -> Option<String> {
        let relative = file_path.strip_prefix(&self.root).ok()?;
        match relative.to_str() {
            Some(relative) => Some(norm_path(relative)),
            None => {
                log::warn!("Skipping non UTF-8 file name {}", file_path.display());
                None
            }
        }
    }

    /// Metadata of a regular file; anything else counts as missing.
    fn file_metadata(key: &str, file_path: &Path) -> Result<fs::Metadata> {
        match fs::metadata(file_path) {
            Ok(attr) if attr.is_file() => Ok(attr),
            Ok(_) => Err(Error::not_found(key)),
            Err(error) => Err(not_found_or(error, key)),
        }
    }
}

fn not_found_or(error: io::Error, key: &str) -> Error {
    if error.kind() == io::ErrorKind::NotFound {
        Error::not_found(key)
    } else {
        Error::Io(error)
    }
}

/// Canonical form of `path` if it is a directory we can write into.
fn writable_dir(path: &Path) -> io::Result<PathBuf> {
    let attr = fs::metadata(path)?;
    if !attr.is_dir() {
        return Err(io::Error::other("not a directory"));
    }
    if attr.permissions().readonly() {
        return Err(io::Error::other("directory is read-only"));
    }
    path.canonicalize()
}

fn ensure_parent(file_path: &Path) -> io::Result<&Path> {
    let parent = file_path
        .parent()
        .ok_or_else(|| io::Error::other("File path has no parent directory"))?;
    fs::create_dir_all(parent)?;
    Ok(parent)
}

/// Copy `src` next to `dst` and rename it into place, so `dst` never shows a
/// partial file.
fn copy_into(src: &Path, dst: &Path) -> io::Result<()> {
    let parent = ensure_parent(dst)?;
    let mut source = File::open(src)?;
    let mut staged = NamedTempFile::new_in(parent)?;
    io::copy(&mut source, &mut staged)?;
    staged
        .as_file()
        .set_permissions(source.metadata()?.permissions())?;
    staged.persist(dst).map_err(|err| err.error)?;
    Ok(())
}

/// Move a committed temp file to its destination.
fn publish(staged: NamedTempFile, dst: &Path) -> Result<()> {
    let parent = ensure_parent(dst)?;
    match staged.persist(dst) {
        Ok(_) => Ok(()),
        Err(err) => {
            // Staging lives in the system temp dir, which may be another
            // device. Copy beside the destination and rename from there.
            log::debug!(
                "Renaming into {} failed ({}), copying instead...",
                dst.display(),
                err.error
            );
            let mut staged = err.file;
            staged.rewind()?;
            let mut local = NamedTempFile::new_in(parent)?;
            io::copy(&mut staged, &mut local)?;
            local
                .as_file()
                .set_permissions(staged.as_file().metadata()?.permissions())?;
            local.persist(dst).map_err(|err| Error::Io(err.error))?;
            Ok(())
        }
    }
}

#[cfg(unix)]
fn file_mode(attr: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    attr.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(attr: &fs::Metadata) -> u32 {
    if attr.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

impl Bucket for LocalBucket {
    fn ls(&self, pattern: &str) -> Result<Paths<'_>> {
        let pattern = pattern.trim_start_matches('/');
        let matcher = Pattern::new(pattern)?;
        let start_key = glob::literal_dir(pattern);
        let (_, start) = self.file_path(start_key)?;

        if !start.is_dir() {
            log::trace!("Nothing to list below {}", start.display());
            return Ok(Box::new(std::iter::empty()));
        }

        log::trace!("Listing {} below {}...", matcher, start.display());
        let entries = walkdir::WalkDir::new(start).sort_by_file_name().into_iter();
        Ok(Box::new(entries.filter_map(move |entry| match entry {
            // Symlinks count when they point at a file, as they do for `info`.
            Ok(entry) if entry.path().is_file() => self
                .key_of(entry.path())
                .filter(|key| matcher.matches(key))
                .map(Ok),
            Ok(_) => None,
            // Removed while we were walking.
            Err(error) if error.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {
                None
            }
            Err(error) => Some(Err(Error::Io(error.into()))),
        })))
    }

    fn info(&self, path: &str) -> Result<FileInfo> {
        let (key, file_path) = self.file_path(path)?;
        let attr = Self::file_metadata(&key, &file_path)?;
        Ok(FileInfo::new(key)
            .with_size(attr.len())
            .with_mtime(attr.modified()?)
            .with_mode(file_mode(&attr)))
    }

    fn create(&self, path: &str, options: CreateOptions) -> Result<Writer> {
        let (key, file_path) = self.file_path(path)?;
        if options.get_content_type().is_some() || !options.get_metadata().is_empty() {
            log::trace!("Content type and metadata of {} are not persisted", key);
        }
        let perm = options.get_perm().unwrap_or(self.perm);
        log::debug!("Creating {}...", file_path.display());
        Writer::new(&key, perm, move |staged| publish(staged, &file_path))
    }

    fn open(&self, path: &str) -> Result<ObjectReader> {
        let (key, file_path) = self.file_path(path)?;
        log::debug!("Opening {}...", file_path.display());
        let file = File::open(&file_path).map_err(|e| not_found_or(e, &key))?;
        if !file.metadata()?.is_file() {
            return Err(Error::not_found(key));
        }
        Ok(Box::new(BufReader::new(file)))
    }

    fn rm(&self, path: &str) -> Result<()> {
        let (_, file_path) = self.file_path(path)?;
        log::debug!("Removing {}...", file_path.display());
        match fs::remove_file(&file_path) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error.into()),
            _ => Ok(()),
        }
    }

    fn cp(&self, src: &str, dst: &str) -> Result<()> {
        let (src_key, src_path) = self.file_path(src)?;
        let (_, dst_path) = self.file_path(dst)?;
        Self::file_metadata(&src_key, &src_path)?;

        log::debug!("Copying {} to {}...", src_path.display(), dst_path.display());
        copy_into(&src_path, &dst_path).map_err(|e| not_found_or(e, &src_key))
    }

    fn mv(&self, src: &str, dst: &str) -> Result<()> {
        let (src_key, src_path) = self.file_path(src)?;
        let (_, dst_path) = self.file_path(dst)?;
        Self::file_metadata(&src_key, &src_path)?;

        log::debug!("Moving {} to {}...", src_path.display(), dst_path.display());
        ensure_parent(&dst_path)?;
        if let Err(error) = fs::rename(&src_path, &dst_path) {
            if !src_path.exists() {
                return Err(Error::not_found(src_key));
            }
            log::debug!("Rename failed ({}), copying instead...", error);
            copy_into(&src_path, &dst_path)?;
            fs::remove_file(&src_path)?;
        }
        Ok(())
    }
}

/// Builds [`LocalBucket`]s for `file://` URLs.
///
/// The root is the URL's host joined with its path. A host other than
/// `localhost` makes the root relative to the working directory. Options:
///
/// - `scope=root`: root the bucket at `/` instead.
/// - `scope=dir`: root the bucket at the parent of the URL's path.
/// - `perm`: octal default permissions for new files.
pub fn local_factory(url: &Url, options: &Options) -> Result<BucketBox> {
    let path = url_path(url)?;
    let root = match options.get("scope") {
        None | Some("") => path,
        Some("root") => path
            .ancestors()
            .last()
            .filter(|root| path.has_root() && !root.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/")),
        Some("dir") => match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        },
        Some(other) => {
            return Err(Error::InvalidOption {
                key: "scope".to_string(),
                message: format!("expected \"root\" or \"dir\", got {:?}", other),
            })
        }
    };

    let mut bucket = LocalBucket::new(root)?;
    if let Some(perm) = options.perm()? {
        bucket = bucket.with_perm(perm);
    }
    Ok(Box::new(bucket))
}

fn url_path(url: &Url) -> Result<PathBuf> {
    match url.host_str() {
        None | Some("") | Some("localhost") => url.to_file_path().map_err(|()| Error::InvalidPath {
            path: url.path().to_string(),
            message: "not a local file path".to_string(),
        }),
        Some(host) => Ok(Path::new(host).join(url.path().trim_start_matches('/'))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketfs_core::test_suite::{self, Features};
    use tempfile::TempDir;

    fn bucket() -> (TempDir, LocalBucket) {
        let dir = tempfile::tempdir().unwrap();
        let bucket = LocalBucket::new(dir.path()).unwrap();
        (dir, bucket)
    }

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn passes_conformance_suite() {
        let (_dir, bucket) = bucket();
        test_suite::run_all_with(&bucket, Features::bytes_only());
    }

    #[test]
    fn files_land_below_root() {
        let (dir, bucket) = bucket();
        bucket.write("/a/b/c.txt", b"data", CreateOptions::new()).unwrap();
        assert_eq!(fs::read(dir.path().join("a/b/c.txt")).unwrap(), b"data");
    }

    #[test]
    fn lists_files_written_outside_the_bucket() {
        let (dir, bucket) = bucket();
        fs::create_dir_all(dir.path().join("x/y")).unwrap();
        fs::write(dir.path().join("x/y/z.txt"), b"z").unwrap();
        fs::write(dir.path().join("top.txt"), b"t").unwrap();

        assert_eq!(test_suite::list(&bucket, "**/*"), vec!["top.txt", "x/y/z.txt"]);
        assert_eq!(test_suite::list(&bucket, "x/**"), vec!["x/y/z.txt"]);
        assert!(test_suite::list(&bucket, "missing/dir/*").is_empty());
        assert!(test_suite::list(&bucket, "x").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn lists_symlinked_files() {
        let (dir, bucket) = bucket();
        fs::write(dir.path().join("real.txt"), b"r").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("sub"), dir.path().join("dir-link")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.txt"), dir.path().join("dangling.txt"))
            .unwrap();

        assert_eq!(test_suite::list(&bucket, "**/*"), vec!["link.txt", "real.txt"]);
        assert_eq!(bucket.info("link.txt").unwrap().size(), 1);
        let infos: Vec<FileInfo> = bucket.glob("*").unwrap().map(|info| info.unwrap()).collect();
        assert_eq!(infos.len(), 2);
        assert!(bucket.info("dangling.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn rejects_invalid_roots() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, b"").unwrap();

        assert!(matches!(
            LocalBucket::new(dir.path().join("missing")),
            Err(Error::InvalidRoot { .. })
        ));
        assert!(matches!(LocalBucket::new(&file), Err(Error::InvalidRoot { .. })));
    }

    #[test]
    fn rejects_parent_segments() {
        let (_dir, bucket) = bucket();
        assert!(matches!(
            bucket.write("../escape.txt", b"x", CreateOptions::new()),
            Err(Error::InvalidPath { .. })
        ));
        assert!(matches!(bucket.ls("../*"), Err(Error::InvalidPath { .. })));
    }

    #[test]
    fn directories_are_not_files() {
        let (_dir, bucket) = bucket();
        bucket.write("a/b.txt", b"x", CreateOptions::new()).unwrap();
        assert!(bucket.info("a").unwrap_err().is_not_found());
        assert!(bucket.open("a").map(|_| ()).unwrap_err().is_not_found());
        assert!(bucket.cp("a", "b").unwrap_err().is_not_found());
    }

    #[test]
    fn long_file_names_are_accepted() {
        let (dir, bucket) = bucket();
        let name = "n".repeat(250);
        bucket
            .write(&format!("dir/{}", name), b"x", CreateOptions::new())
            .unwrap();
        assert_eq!(fs::read(dir.path().join("dir").join(&name)).unwrap(), b"x");
    }

    #[test]
    fn staged_data_is_invisible() {
        let (dir, bucket) = bucket();
        let mut writer = bucket.create("staged.txt", CreateOptions::new()).unwrap();
        writer.write(b"pending").unwrap();
        let staging = writer.staging_path().unwrap().to_path_buf();
        assert!(!staging.starts_with(dir.path()));
        assert!(!dir.path().join("staged.txt").exists());

        writer.commit().unwrap();
        assert!(!staging.exists());
        assert_eq!(fs::read(dir.path().join("staged.txt")).unwrap(), b"pending");
    }

    #[cfg(unix)]
    #[test]
    fn applies_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = LocalBucket::new(dir.path()).unwrap().with_perm(0o600);

        bucket.write("default.txt", b"x", CreateOptions::new()).unwrap();
        assert_eq!(bucket.info("default.txt").unwrap().mode(), 0o600);

        bucket
            .write("explicit.txt", b"x", CreateOptions::new().perm(0o640))
            .unwrap();
        assert_eq!(bucket.info("explicit.txt").unwrap().mode(), 0o640);

        bucket.cp("explicit.txt", "copy.txt").unwrap();
        assert_eq!(bucket.info("copy.txt").unwrap().mode(), 0o640);
    }

    #[test]
    fn factory_roots_at_url_path() {
        let dir = tempfile::tempdir().unwrap();
        let raw = Url::from_directory_path(dir.path()).unwrap();
        let bucket = local_factory(&raw, &Options::new()).unwrap();
        bucket.write("x.txt", b"x", CreateOptions::new()).unwrap();
        assert!(dir.path().join("x.txt").exists());
    }

    #[test]
    fn factory_scopes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sibling.txt"), b"s").unwrap();

        let sub = Url::from_file_path(dir.path().join("sub")).unwrap();
        let opts: Options = [("scope", "dir")].into_iter().collect();
        let bucket = local_factory(&sub, &opts).unwrap();
        assert_eq!(bucket.read("sibling.txt").unwrap(), b"s");

        let opts: Options = [("scope", "root")].into_iter().collect();
        let bucket = local_factory(&sub, &opts).unwrap();
        let absolute = dir.path().canonicalize().unwrap().join("sibling.txt");
        assert_eq!(bucket.read(absolute.to_str().unwrap()).unwrap(), b"s");

        let opts: Options = [("scope", "nope")].into_iter().collect();
        assert!(matches!(
            local_factory(&sub, &opts),
            Err(Error::InvalidOption { .. })
        ));
    }

    #[test]
    fn factory_rejects_missing_root() {
        assert!(matches!(
            local_factory(&url("file:///definitely/not/here"), &Options::new()),
            Err(Error::InvalidRoot { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn factory_reads_perm() {
        let dir = tempfile::tempdir().unwrap();
        let raw = Url::from_directory_path(dir.path()).unwrap();
        let opts: Options = [("perm", "0600")].into_iter().collect();
        let bucket = local_factory(&raw, &opts).unwrap();
        bucket.write("x.txt", b"x", CreateOptions::new()).unwrap();
        assert_eq!(bucket.info("x.txt").unwrap().mode(), 0o600);

        let opts: Options = [("perm", "rw")].into_iter().collect();
        assert!(local_factory(&raw, &opts).is_err());
    }
}
