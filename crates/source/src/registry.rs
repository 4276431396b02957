use crate::context::SourceContext;
use crate::directory::DirectorySource;
use crate::file::FileSource;
use crate::source::SourceHandle;
use crate::zip::ZipSource;
use quarry_registry::{FactoryRecord, Registry};
use quarry_storage::{FilePipe, Pipe};
use std::path::Path;
use std::sync::Arc;

/// Decides which kind of source to mount for a path.
pub type SourceRegistry = Registry<Path, SourceHandle>;

pub type SourceRecord = FactoryRecord<Path, SourceHandle>;

const ZIP_SIGNATURES: [&[u8]; 2] = [b"PK\x03\x04", b"PK\x05\x06"];

fn is_zip(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    let Ok(mut stream) = FilePipe::new(path).open() else {
        return false;
    };
    ZIP_SIGNATURES.iter().any(|signature| stream.check_signature(signature).unwrap_or(false))
}

/// Registry with the built-in source kinds: zip archives, directories and
/// plain files, tried in that order.
pub fn source_registry(context: &SourceContext) -> SourceRegistry {
    let mut registry = SourceRegistry::new("source", |path| path.display().to_string());
    let zip = context.clone();
    let directory = context.clone();
    let file = context.clone();
    registry
        .register(
            SourceRecord::new("zip", move |path| Ok(Arc::new(ZipSource::new(path, zip.clone())?) as SourceHandle))
                .compatible(is_zip)
                .priority(20),
        )
        .register(
            SourceRecord::new("directory", move |path| {
                Ok(Arc::new(DirectorySource::new(path, directory.clone())?) as SourceHandle)
            })
            .compatible(Path::is_dir)
            .priority(10),
        )
        .register(
            SourceRecord::new("file", move |path| Ok(Arc::new(FileSource::new(path, file.clone())?) as SourceHandle))
                .compatible(Path::is_file),
        );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_registry::Registries;
    use quarry_registry::testing::count_warnings;
    use quarry_storage::error::ErrorKind;
    use std::io::Write;
    use tempfile::tempdir;

    fn registry() -> SourceRegistry {
        source_registry(&SourceContext::new(Arc::new(Registries::new())))
    }

    #[test]
    fn test_picks_kind_by_path() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pack.dat");
        let mut writer = zip::ZipWriter::new(std::fs::File::create(&archive).unwrap());
        writer.start_file("inside.txt", zip::write::SimpleFileOptions::default()).unwrap();
        writer.write_all(b"zipped").unwrap();
        writer.finish().unwrap();
        let plain = dir.path().join("plain.txt");
        std::fs::write(&plain, "plain").unwrap();

        let registry = registry();
        // Zip sources are picked by signature, whatever the extension.
        assert_eq!(registry.make(&archive).unwrap().paths(), ["inside.txt"]);
        assert_eq!(registry.make(&plain).unwrap().paths(), ["plain.txt"]);
        let mut paths = registry.make(dir.path()).unwrap().paths();
        paths.sort();
        assert_eq!(paths, ["pack.dat", "plain.txt"]);
    }

    #[test]
    fn test_corrupt_archive_falls_back_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"PK\x03\x04 not an archive").unwrap();

        let (source, warnings) = count_warnings(|| registry().make(&path));
        assert_eq!(warnings, 1);
        assert_eq!(source.unwrap().paths(), ["broken.zip"]);
    }

    #[test]
    fn test_nothing_compatible() {
        let dir = tempdir().unwrap();
        let err = registry().make(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound { what: "nothing compatible", .. }));
    }
}
