use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ScriptIoError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is {len} bytes, limit is {limit}", path.display())]
    TooLarge { path: PathBuf, len: u64, limit: usize },
    #[error("{} is not valid UTF-8 after byte {valid_up_to}", path.display())]
    NotUtf8 { path: PathBuf, valid_up_to: usize },
}

/// Read a script. Files over `limit` bytes are rejected before they are
/// read; the contents must be UTF-8.
pub fn load_script(path: &Path, limit: Option<usize>) -> Result<String, ScriptIoError> {
    let io_err = |source| ScriptIoError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(limit) = limit {
        let len = fs::metadata(path).map_err(io_err)?.len();
        if len > limit as u64 {
            return Err(ScriptIoError::TooLarge {
                path: path.to_path_buf(),
                len,
                limit,
            });
        }
    }

    let bytes = fs::read(path).map_err(io_err)?;
    String::from_utf8(bytes).map_err(|err| ScriptIoError::NotUtf8 {
        path: path.to_path_buf(),
        valid_up_to: err.utf8_error().valid_up_to(),
    })
}

pub fn save_script(path: &Path, text: &str) -> Result<(), io::Error> {
    fs::write(path, text)
}
