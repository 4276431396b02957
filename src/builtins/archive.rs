use quarry_registry::ScannerRecord;
use quarry_storage::error::Result;
use quarry_storage::{Node, PipeHandle, zip_entries};

const LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const EMPTY_ARCHIVE: &[u8] = b"PK\x05\x06";

fn is_zip(pipe: &PipeHandle) -> Result<bool> {
    let mut stream = pipe.open()?;
    Ok(stream.check_signature(LOCAL_HEADER)? || stream.check_signature(EMPTY_ARCHIVE)?)
}

/// Expand an archive into one node per file entry.
fn scan_zip(pipe: &PipeHandle, callback: &mut dyn FnMut(Node)) -> Result<bool> {
    if !is_zip(pipe)? {
        return Ok(false);
    }
    for node in zip_entries(pipe)? {
        callback(node);
    }
    Ok(true)
}

pub(crate) fn scanner() -> ScannerRecord {
    ScannerRecord::new("zip archive", scan_zip).mime_types(["application/zip"]).extensions(["zip"]).inspect(true)
}
