//! Node identity, loaded once from the persistent store.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

use air_encoding::types::NodeId;

/// Default location of the identity file on a provisioned node.
pub const DEFAULT_ID_PATH: &str = "/etc/air/id";

static NODE_ID: OnceLock<NodeId> = OnceLock::new();

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// The file's token fails the identity grammar.
    Invalid(air_encoding::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "cannot read identity file: {e}"),
            Error::Invalid(_) => f.write_str("identity file holds an invalid identity"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(error)
    }
}

/// Reads and validates the single identity token in `path`.
pub fn load(path: &Path) -> Result<NodeId, Error> {
    let text = fs::read_to_string(path)?;
    NodeId::new(text.trim()).map_err(Error::Invalid)
}

/// The process-wide identity, read from [`DEFAULT_ID_PATH`] on first use
/// and immutable afterwards.
pub fn node_id() -> Result<&'static NodeId, Error> {
    if let Some(id) = NODE_ID.get() {
        return Ok(id);
    }
    let id = load(Path::new(DEFAULT_ID_PATH))?;
    Ok(NODE_ID.get_or_init(|| id))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn loads_trimmed_token() {
        let path = std::env::temp_dir().join(format!("air-id-{}", std::process::id()));
        std::fs::write(&path, "CAR/01\n").unwrap();
        let id = load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(id.as_str(), "CAR/01");
    }

    #[test]
    fn rejects_reserved_prefix() {
        let path = std::env::temp_dir().join(format!("air-id-bad-{}", std::process::id()));
        std::fs::write(&path, "UNIT7\n").unwrap();
        let result = load(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(Error::Invalid(_))));
    }
}
