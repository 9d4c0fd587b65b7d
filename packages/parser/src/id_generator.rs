use crc32fast::Hasher;

/// Stable identifier of a document, derived from its resource path
pub fn document_id(path: &str) -> String {
    let uri = if path.starts_with("file://") {
        path.to_string()
    } else {
        format!("file://{}", path)
    };

    let mut hasher = Hasher::new();
    hasher.update(uri.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hands out node ids of the form `<document-id>-<n>`
///
/// Ids are never reused within one generator, so nodes created by commands
/// cannot collide with nodes produced by the parser.
#[derive(Debug, Clone)]
pub struct IDGenerator {
    seed: String,
    count: u64,
}

impl IDGenerator {
    pub fn new(path: &str) -> Self {
        Self::from_seed(document_id(path))
    }

    pub fn from_seed(seed: String) -> Self {
        Self { seed, count: 0 }
    }

    pub fn next_id(&mut self) -> String {
        self.count += 1;
        format!("{}-{}", self.seed, self.count)
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_is_stable_per_path() {
        assert_eq!(document_id("/pom.xml"), document_id("file:///pom.xml"));
        assert_ne!(document_id("/pom.xml"), document_id("/other/pom.xml"));
    }

    #[test]
    fn test_sequential_ids() {
        let mut ids = IDGenerator::new("/pom.xml");
        let first = ids.next_id();
        let second = ids.next_id();

        assert!(first.starts_with(ids.seed()));
        assert!(first.ends_with("-1"));
        assert!(second.ends_with("-2"));
        assert_eq!(ids.issued(), 2);
    }
}
