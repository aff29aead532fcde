use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const CHUNK_SIZE: usize = 8192;

/// Hex-encoded SHA-256 of a file, read in fixed-size chunks.
pub fn sha256_file(path: impl AsRef<Path>) -> std::io::Result<String> {
    let mut file = File::open(path.as_ref())?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::sha256_file;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn digest_of_known_content_matches_reference() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("abc.txt");
        fs::write(&path, "abc").expect("file should be written");

        assert_eq!(
            sha256_file(&path).expect("digest should compute"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digest_spans_multiple_chunks() {
        let temp = TempDir::new().expect("tempdir should be created");
        let first = temp.path().join("first.bin");
        let second = temp.path().join("second.bin");
        let mut content = vec![7u8; 20_000];
        fs::write(&first, &content).expect("file should be written");
        content[19_999] = 8;
        fs::write(&second, &content).expect("file should be written");

        let first_digest = sha256_file(&first).expect("digest should compute");
        let second_digest = sha256_file(&second).expect("digest should compute");
        assert_eq!(first_digest.len(), 64);
        assert_ne!(first_digest, second_digest);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        assert!(sha256_file(temp.path().join("absent.png")).is_err());
    }
}
