use derive_more::Display;
use quarry_registry::{LoaderRecord, SaverRecord};
use quarry_storage::PipeHandle;
use quarry_storage::error::{ErrorKind, Result};
use std::io::Write;

/// UTF-8 text with LF line endings.
#[derive(Debug, Display, Clone, Default, PartialEq, Eq)]
pub struct Text(pub String);

fn load_text(pipe: &PipeHandle) -> Result<Option<Text>> {
    Ok(Some(Text(pipe.open()?.get_text()?)))
}

fn save_text(text: &Text, writer: &mut dyn Write) -> Result<()> {
    writer.write_all(text.0.as_bytes()).map_err(|e| ErrorKind::platform("io", e))
}

/// Text has no signature, so it is only ever picked by extension.
pub(crate) fn loader() -> LoaderRecord {
    LoaderRecord::new("plain text", load_text).extensions(["txt", "text"]).inspect(false)
}

pub(crate) fn saver() -> SaverRecord {
    SaverRecord::new("plain text", save_text).formats(["text"]).extensions(["txt", "text"])
}
