//! Request fingerprinting
//!
//! A [`RequestFingerprint`] is a stable, content-addressed hash of
//! `(group, normalized_params, content_digest)`. Two logically identical
//! requests — including audio inputs presented through different Rust-level
//! wrapper types — must hash identically; two requests with different
//! content must not collide (modulo hash collisions).

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

/// Stable hash identifying an upstream-equivalent request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    /// The fingerprint's hex-encoded digest, used as the cache/store key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replaces the source's duck-typed `str | PathLike | bytes | bytearray |
/// tuple | file-like` audio input with a tagged variant normalized once at
/// ingress ("Design Notes").
#[derive(Debug, Clone)]
pub enum AudioInput {
    /// A path to a file on disk.
    Path(PathBuf),
    /// Raw bytes already read into memory.
    Bytes(Vec<u8>),
    /// An explicit `(filename, content)` pair, where `content` may itself be
    /// a path or raw bytes — mirrors the source's `(filename, content)`
    /// tuple form.
    Named {
        filename: String,
        content: Box<AudioInput>,
    },
}

impl AudioInput {
    /// Resolve to the underlying bytes, reading from disk if necessary.
    /// Identical bytes produce an identical fingerprint regardless of which
    /// variant supplied them.
    pub fn resolve_bytes(&self) -> io::Result<Vec<u8>> {
        match self {
            AudioInput::Bytes(b) => Ok(b.clone()),
            AudioInput::Path(p) => std::fs::read(p),
            AudioInput::Named { content, .. } => content.resolve_bytes(),
        }
    }

    /// Construct from a plain byte buffer.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        AudioInput::Bytes(bytes.into())
    }

    /// Construct from a filesystem path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        AudioInput::Path(path.as_ref().to_path_buf())
    }
}

/// Compute the fingerprint for a text-like request (chat completion,
/// embedding, rerank, ...): `group` plus a canonical JSON encoding of the
/// normalized parameters, which already includes the messages/inputs.
pub fn fingerprint_text<P: Serialize>(group: &str, normalized_params: &P) -> RequestFingerprint {
    let canonical = serde_json::to_string(normalized_params)
        .unwrap_or_default();
    fingerprint_parts(group, canonical.as_bytes())
}

/// Compute the fingerprint for an audio request: `group` plus the
/// normalized params plus `sha256(bytes)` of the audio content, regardless
/// of how that content was supplied.
pub fn fingerprint_audio<P: Serialize>(
    group: &str,
    normalized_params: &P,
    input: &AudioInput,
) -> io::Result<RequestFingerprint> {
    let bytes = input.resolve_bytes()?;
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let content_digest = hasher.finalize();

    let canonical = serde_json::to_string(normalized_params).unwrap_or_default();
    let mut combined = canonical.into_bytes();
    combined.extend_from_slice(&content_digest);
    Ok(fingerprint_parts(group, &combined))
}

fn fingerprint_parts(group: &str, content: &[u8]) -> RequestFingerprint {
    let mut hasher = Sha256::new();
    hasher.update(group.as_bytes());
    hasher.update(b"\0");
    hasher.update(content);
    RequestFingerprint(hex_encode(hasher.finalize().as_slice()))
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{b:02x}").expect("writing to String cannot fail");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_text_params_same_fingerprint() {
        let a = fingerprint_text("gpt-4", &json!({"messages": [{"role": "user", "content": "hi"}]}));
        let b = fingerprint_text("gpt-4", &json!({"messages": [{"role": "user", "content": "hi"}]}));
        assert_eq!(a, b);
    }

    #[test]
    fn different_group_different_fingerprint() {
        let a = fingerprint_text("gpt-4", &json!({"messages": []}));
        let b = fingerprint_text("gpt-3.5-turbo", &json!({"messages": []}));
        assert_ne!(a, b);
    }

    #[test]
    fn audio_fingerprint_stable_across_wrapper_types() {
        let bytes = b"fake-wav-bytes".to_vec();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, &bytes).unwrap();

        let from_bytes = AudioInput::from_bytes(bytes.clone());
        let from_path = AudioInput::from_path(&path);
        let named = AudioInput::Named {
            filename: "clip.wav".to_string(),
            content: Box::new(AudioInput::from_bytes(bytes.clone())),
        };

        let params = json!({"model": "whisper-1"});
        let fp_bytes = fingerprint_audio("whisper", &params, &from_bytes).unwrap();
        let fp_path = fingerprint_audio("whisper", &params, &from_path).unwrap();
        let fp_named = fingerprint_audio("whisper", &params, &named).unwrap();

        assert_eq!(fp_bytes, fp_path);
        assert_eq!(fp_bytes, fp_named);
    }

    #[test]
    fn audio_fingerprint_differs_on_content() {
        let params = json!({"model": "whisper-1"});
        let a = fingerprint_audio("whisper", &params, &AudioInput::from_bytes(b"a".to_vec())).unwrap();
        let b = fingerprint_audio("whisper", &params, &AudioInput::from_bytes(b"b".to_vec())).unwrap();
        assert_ne!(a, b);
    }
}
