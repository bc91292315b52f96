//! Embedding of the compiled wasm payload in the output.
use std::path::Path;

use base64::Engine;

use crate::error::{PackageError, Result};
use crate::options::Target;

/// Brotli quality used for embedded payloads.
const BROTLI_QUALITY: i32 = 11;
const BROTLI_WINDOW: i32 = 22;

/// Read the wasm payload and build the expression that evaluates to it.
pub fn payload_from_file<P: AsRef<Path>>(
    path: P,
    target: Option<Target>,
) -> Result<String> {
    let path = path.as_ref();
    let bytes =
        std::fs::read(path).map_err(|e| PackageError::io(path, e))?;
    log::debug!("embedding {} ({} bytes)", path.display(), bytes.len());
    payload_literal(&bytes, target).map_err(|e| PackageError::io(path, e))
}

/// Expression evaluating to the payload bytes.
///
/// For the modern node target the bytes are brotli compressed and
/// inflated at load time with `node:zlib`; other targets get a plain
/// `Uint8Array` literal.
pub fn payload_literal(
    bytes: &[u8],
    target: Option<Target>,
) -> std::io::Result<String> {
    if target == Some(Target::Node) {
        let compressed = compress(bytes)?;
        log::debug!(
            "compressed wasm payload {} -> {} bytes",
            bytes.len(),
            compressed.len()
        );
        let data = base64::prelude::BASE64_STANDARD.encode(&compressed);
        return Ok(format!(
            "require(\"node:zlib\").brotliDecompressSync(Buffer.from(\"{}\",\"base64\"))",
            data
        ));
    }
    let list = bytes
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(",");
    Ok(format!("new Uint8Array([{}])", list))
}

fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let params = brotli::enc::BrotliEncoderParams {
        quality: BROTLI_QUALITY,
        lgwin: BROTLI_WINDOW,
        ..Default::default()
    };
    let mut out = Vec::new();
    brotli::BrotliCompress(&mut &bytes[..], &mut out, &params)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    const WASM_HEADER: &[u8] = &[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

    #[test]
    fn plain_byte_array_for_other_targets() {
        for target in &[None, Some(Target::NodeLegacy), Some(Target::Web), Some(Target::Worker)] {
            let lit = payload_literal(WASM_HEADER, *target).unwrap();
            assert_eq!(lit, "new Uint8Array([0,97,115,109,1,0,0,0])");
        }
    }

    #[test]
    fn compressed_payload_for_node() {
        let lit = payload_literal(WASM_HEADER, Some(Target::Node)).unwrap();
        let prefix = "require(\"node:zlib\").brotliDecompressSync(Buffer.from(\"";
        assert!(lit.starts_with(prefix));
        let data = &lit[prefix.len()..lit.len() - "\",\"base64\"))".len()];
        let compressed = base64::prelude::BASE64_STANDARD.decode(data).unwrap();
        let mut inflated = Vec::new();
        brotli::Decompressor::new(&compressed[..], 4096)
            .read_to_end(&mut inflated)
            .unwrap();
        assert_eq!(inflated, WASM_HEADER);
    }
}
