use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use bucketfs::{BucketFileSystem, CopyOption, FsErrorKind, OpenOption, OpenOptions};

/// The file stores behind the filesystem, one per line.
pub fn buckets(fs: &BucketFileSystem, out: &mut impl Write) -> Result<()> {
    for store in fs.file_stores()? {
        let created = store
            .container()
            .created
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        writeln!(out, "{}\t{}\t{}", store.name(), store.store_type(), created)?;
    }
    Ok(())
}

/// Lists the immediate children of a directory. Directories get a
/// trailing `/`.
pub fn list(fs: &BucketFileSystem, remote: &str, out: &mut impl Write) -> Result<()> {
    let dir = fs.path([remote]);
    for child in fs.read_dir(&dir)? {
        let name = child.segments().last().cloned().unwrap_or_default();
        match fs.metadata(&child) {
            Ok(meta) if meta.is_regular_file() => {
                let modified = meta
                    .last_modified
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                writeln!(out, "{:>12}  {}  {}", meta.size, modified, name)?;
            }
            // Prefixes without a folder marker still list as directories.
            Ok(_) => writeln!(out, "{:>12}  {:19}  {}/", "-", "", name)?,
            Err(e) if e.kind() == FsErrorKind::NotFound => {
                writeln!(out, "{:>12}  {:19}  {}/", "-", "", name)?
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Prints the attributes selected by `query` as JSON.
pub fn stat(fs: &BucketFileSystem, remote: &str, query: &str, out: &mut impl Write) -> Result<()> {
    let path = fs.path([remote]);
    let attributes = fs
        .read_attributes(&path, query)
        .with_context(|| format!("reading attributes of {}", path))?;
    serde_json::to_writer_pretty(&mut *out, &attributes)?;
    writeln!(out)?;
    Ok(())
}

pub fn cat(fs: &BucketFileSystem, remote: &str, out: &mut impl Write) -> Result<u64> {
    let path = fs.path([remote]);
    let mut channel = fs.new_channel(&path, OpenOptions::read_only())?;
    let copied = io::copy(&mut channel, out)?;
    channel.close()?;
    Ok(copied)
}

/// Uploads a local file, replacing the remote object if it exists.
pub fn put(fs: &BucketFileSystem, local: &Path, remote: &str) -> Result<u64> {
    let mut source =
        File::open(local).with_context(|| format!("opening {}", local.display()))?;
    let path = fs.path([remote]);
    let mut channel = fs.new_channel(
        &path,
        [
            OpenOption::Create,
            OpenOption::Write,
            OpenOption::TruncateExisting,
        ],
    )?;
    let copied = io::copy(&mut source, &mut channel)?;
    channel.close()?;
    info!(local = %local.display(), remote = %path, bytes = copied, "uploaded");
    Ok(copied)
}

pub fn get(fs: &BucketFileSystem, remote: &str, local: &Path) -> Result<u64> {
    let path = fs.path([remote]);
    let mut channel = fs.new_channel(&path, OpenOptions::read_only())?;
    let mut target =
        File::create(local).with_context(|| format!("creating {}", local.display()))?;
    let copied = io::copy(&mut channel, &mut target)?;
    target.flush()?;
    channel.close()?;
    debug!(remote = %path, local = %local.display(), bytes = copied, "downloaded");
    Ok(copied)
}

pub fn mkdir(fs: &BucketFileSystem, remote: &str) -> Result<()> {
    let path = fs.path([remote]);
    if fs.exists(&path)? {
        bail!("{} already exists", path);
    }
    fs.create_directory(&path)?;
    Ok(())
}

pub fn remove(fs: &BucketFileSystem, remote: &str) -> Result<()> {
    let path = fs.path([remote]);
    if !fs.exists(&path)? {
        bail!("{} does not exist", path);
    }
    fs.delete(&path)?;
    Ok(())
}

pub fn copy(
    fs: &BucketFileSystem,
    source: &str,
    target: &str,
    copy_attributes: bool,
    replace: bool,
) -> Result<()> {
    let options = copy_options(copy_attributes, replace);
    fs.copy(&fs.path([source]), &fs.path([target]), &options)?;
    Ok(())
}

pub fn rename(fs: &BucketFileSystem, source: &str, target: &str, replace: bool) -> Result<()> {
    let options = copy_options(true, replace);
    fs.rename(&fs.path([source]), &fs.path([target]), &options)?;
    Ok(())
}

fn copy_options(copy_attributes: bool, replace: bool) -> Vec<CopyOption> {
    let mut options = Vec::new();
    if copy_attributes {
        options.push(CopyOption::CopyAttributes);
    }
    if replace {
        options.push(CopyOption::ReplaceExisting);
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketfs::{ConnectionManager, MemoryConnector};
    use std::sync::Arc;

    fn open() -> Arc<BucketFileSystem> {
        let connector = Arc::new(MemoryConnector::new());
        connector
            .store("http://localhost")
            .unwrap()
            .create_container("files")
            .unwrap();
        let manager = ConnectionManager::new(connector);
        manager
            .open("s3://localhost/files", std::iter::empty::<(&str, &str)>())
            .unwrap()
    }

    #[test]
    fn test_put_cat_get() {
        let fs = open();
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("in.txt");
        std::fs::write(&local, b"some text").unwrap();

        assert_eq!(put(&fs, &local, "docs/in.txt").unwrap(), 9);

        let mut out = Vec::new();
        cat(&fs, "docs/in.txt", &mut out).unwrap();
        assert_eq!(out, b"some text");

        let downloaded = dir.path().join("out.txt");
        get(&fs, "docs/in.txt", &downloaded).unwrap();
        assert_eq!(std::fs::read(downloaded).unwrap(), b"some text");
    }

    #[test]
    fn test_list_marks_directories() {
        let fs = open();
        mkdir(&fs, "reports").unwrap();
        fs.write(&fs.path(["notes.txt"]), b"n").unwrap();
        fs.write(&fs.path(["archive/2023/jan.txt"]), b"j").unwrap();

        let mut out = Vec::new();
        list(&fs, "", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("archive/"));
        assert!(lines[1].ends_with("notes.txt"));
        assert!(lines[2].ends_with("reports/"));
    }

    #[test]
    fn test_stat_prints_json() {
        let fs = open();
        fs.write(&fs.path(["a.bin"]), &[0u8; 10]).unwrap();
        let mut out = Vec::new();
        stat(&fs, "a.bin", "basic:size,isDirectory", &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["size"], 10);
        assert_eq!(value["isDirectory"], false);
    }

    #[test]
    fn test_rm_and_mkdir_report_state() {
        let fs = open();
        assert!(remove(&fs, "missing").is_err());
        mkdir(&fs, "d").unwrap();
        assert!(mkdir(&fs, "d").is_err());
        remove(&fs, "d").unwrap();
        assert!(!fs.exists(&fs.path(["d"])).unwrap());
    }

    #[test]
    fn test_copy_and_rename() {
        let fs = open();
        fs.write(&fs.path(["a"]), b"1").unwrap();
        copy(&fs, "a", "b", false, false).unwrap();
        assert!(copy(&fs, "a", "b", false, false).is_err());
        copy(&fs, "a", "b", true, true).unwrap();

        rename(&fs, "b", "c", false).unwrap();
        assert!(!fs.exists(&fs.path(["b"])).unwrap());
        assert_eq!(fs.read(&fs.path(["c"])).unwrap(), b"1");
    }

    #[test]
    fn test_buckets_lists_own_bucket() {
        let fs = open();
        let mut out = Vec::new();
        buckets(&fs, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("files\ts3-Container\t"));
    }
}
