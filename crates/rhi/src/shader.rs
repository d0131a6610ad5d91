//! SPIR-V loading.
//!
//! Shader bytecode is an opaque blob: this module only checks that it looks
//! like SPIR-V (word-aligned, correct magic number). Module creation goes
//! through [`GpuDevice::create_shader_module`].
//!
//! [`GpuDevice::create_shader_module`]: crate::gpu::GpuDevice::create_shader_module

use std::path::Path;

use tracing::debug;

use crate::error::{RhiError, RhiResult};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decodes SPIR-V bytes into little-endian words.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] if the length is zero or not a multiple
/// of 4, or if the magic number is missing.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.is_empty() || !bytes.len().is_multiple_of(4) {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be a non-empty multiple of 4 bytes, got {} bytes",
            bytes.len()
        )));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    if words[0] != SPIRV_MAGIC {
        return Err(RhiError::ShaderError(format!(
            "bad SPIR-V magic number {:#010x}",
            words[0]
        )));
    }

    Ok(words)
}

/// Reads a SPIR-V file and decodes it.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid SPIR-V.
pub fn load_spirv(path: &Path) -> RhiResult<Vec<u32>> {
    debug!("Loading SPIR-V from {:?}", path);
    let bytes = std::fs::read(path).map_err(|e| {
        RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
    })?;
    spirv_words(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_spirv_words_little_endian() {
        let bytes = module_bytes(&[SPIRV_MAGIC, 0x0001_0600, 0xdead_beef]);
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0600, 0xdead_beef]);
        assert_eq!(bytes[0], 0x03);
    }

    #[test]
    fn test_spirv_words_rejects_bad_length() {
        assert!(matches!(spirv_words(&[]), Err(RhiError::ShaderError(_))));

        let mut bytes = module_bytes(&[SPIRV_MAGIC]);
        bytes.push(0);
        assert!(matches!(spirv_words(&bytes), Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_spirv_words_rejects_bad_magic() {
        let bytes = module_bytes(&[SPIRV_MAGIC.swap_bytes(), 0]);
        assert!(matches!(spirv_words(&bytes), Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_load_spirv_missing_file() {
        let err = load_spirv(Path::new("does/not/exist.spv")).unwrap_err();
        assert!(err.to_string().contains("exist.spv"));
    }
}
