// ─── ASAR archives ───
// Minimal writer/reader for Electron's ASAR format: a Chromium pickle holding a
// JSON header, followed by the concatenated file contents.

use std::path::Path;

use serde_json::{json, Map, Value};

use crate::core::error::{InstallerError, InstallerResult};

const PACKAGE_JSON: &str = r#"{"name":"discord","main":"index.js"}"#;

/// Build an archive containing `files` at the archive root.
pub fn build(files: &[(&str, &[u8])]) -> InstallerResult<Vec<u8>> {
    let mut entries = Map::new();
    let mut offset = 0_u64;
    for (name, data) in files {
        entries.insert(
            (*name).to_string(),
            json!({ "size": data.len(), "offset": offset.to_string() }),
        );
        offset += data.len() as u64;
    }

    let header = serde_json::to_vec(&json!({ "files": entries }))?;
    let padded_len = (header.len() + 3) & !3;
    let payload_len = 4 + padded_len;
    let pickle_len = 4 + payload_len;

    let mut out = Vec::with_capacity(8 + pickle_len + offset as usize);
    out.extend_from_slice(&4_u32.to_le_bytes());
    out.extend_from_slice(&(pickle_len as u32).to_le_bytes());
    out.extend_from_slice(&(payload_len as u32).to_le_bytes());
    out.extend_from_slice(&(header.len() as u32).to_le_bytes());
    out.extend_from_slice(&header);
    out.resize(8 + pickle_len, 0);
    for (_, data) in files {
        out.extend_from_slice(data);
    }
    Ok(out)
}

/// Parsed header plus the offset where file data begins.
#[derive(Debug)]
pub struct AsarHeader {
    pub files: Value,
    pub data_offset: usize,
}

pub fn read_header(bytes: &[u8]) -> InstallerResult<AsarHeader> {
    let invalid = |reason: &str| InstallerError::Other(format!("Invalid asar archive: {reason}"));

    let word = |at: usize| -> InstallerResult<usize> {
        bytes
            .get(at..at + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
            .ok_or_else(|| invalid("truncated header"))
    };

    if word(0)? != 4 {
        return Err(invalid("bad size pickle"));
    }
    let pickle_len = word(4)?;
    let header_len = word(12)?;
    let header = 16_usize
        .checked_add(header_len)
        .and_then(|end| bytes.get(16..end))
        .ok_or_else(|| invalid("header out of bounds"))?;

    let parsed: Value = serde_json::from_slice(header)?;
    let files = parsed
        .get("files")
        .cloned()
        .ok_or_else(|| invalid("missing files table"))?;

    let data_offset = pickle_len
        .checked_add(8)
        .ok_or_else(|| invalid("pickle length overflows"))?;

    Ok(AsarHeader { files, data_offset })
}

/// Contents of a top-level file inside the archive.
pub fn read_file<'a>(bytes: &'a [u8], name: &str) -> InstallerResult<&'a [u8]> {
    let header = read_header(bytes)?;
    let entry = header
        .files
        .get(name)
        .ok_or_else(|| InstallerError::Other(format!("{name} not found in asar")))?;

    let size = entry.get("size").and_then(Value::as_u64).unwrap_or(0) as usize;
    let offset = entry
        .get("offset")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(0);

    header
        .data_offset
        .checked_add(offset)
        .and_then(|start| Some(start..start.checked_add(size)?))
        .and_then(|range| bytes.get(range))
        .ok_or_else(|| InstallerError::Other(format!("{name} out of bounds in asar")))
}

/// Loader archive that makes Discord require the cached patcher by absolute path.
pub fn loader_stub(patcher: &Path) -> InstallerResult<Vec<u8>> {
    let quoted = serde_json::to_string(&patcher.to_string_lossy())?;
    let index_js = format!("require({quoted});");
    build(&[
        ("index.js", index_js.as_bytes()),
        ("package.json", PACKAGE_JSON.as_bytes()),
    ])
}

/// True when `bytes` is a loader archive written by [`loader_stub`].
pub fn is_loader_stub(bytes: &[u8]) -> bool {
    let Ok(index) = read_file(bytes, "index.js") else {
        return false;
    };
    std::str::from_utf8(index)
        .map(|js| js.starts_with("require(") && js.ends_with(".js\");") && !js.contains('\n'))
        .unwrap_or(false)
}

/// Written when an unpatch finds no backup to restore. It keeps the archive
/// loadable and tells the user to reinstall Discord instead of crashing silently.
pub fn recovery_stub() -> InstallerResult<Vec<u8>> {
    let index_js = concat!(
        "const { app, dialog } = require(\"electron\");\n",
        "app.whenReady().then(() => {\n",
        "  dialog.showErrorBox(\"Discord\", \"The original app.asar could not be restored. Please reinstall Discord.\");\n",
        "  app.quit();\n",
        "});\n",
    );
    build(&[
        ("index.js", index_js.as_bytes()),
        ("package.json", PACKAGE_JSON.as_bytes()),
    ])
}
