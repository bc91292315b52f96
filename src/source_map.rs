//! Source map composition and finalization.
use std::path::Path;

use base64::Engine;
use sourcemap::{SourceMap, SourceMapBuilder};

use crate::error::{PackageError, Result};

/// Map each token of `outer` through the map `inner_for` returns for its
/// source. Tokens whose source has no inner map are kept as they are,
/// tokens the inner map cannot resolve are dropped.
pub fn compose<'a, F>(outer: &SourceMap, inner_for: F) -> SourceMap
where
    F: Fn(&str) -> Option<&'a SourceMap>,
{
    let mut builder = SourceMapBuilder::new(outer.get_file());
    for token in outer.tokens() {
        let source = match token.get_source() {
            Some(source) => source,
            None => continue,
        };
        match inner_for(source) {
            Some(inner) => {
                let found = inner
                    .lookup_token(token.get_src_line(), token.get_src_col())
                    .filter(|t| t.get_dst_line() == token.get_src_line());
                if let Some(orig) = found {
                    if orig.has_source() {
                        builder.add(
                            token.get_dst_line(),
                            token.get_dst_col(),
                            orig.get_src_line(),
                            orig.get_src_col(),
                            orig.get_source(),
                            orig.get_name().or_else(|| token.get_name()),
                        );
                    }
                }
            }
            None => {
                builder.add(
                    token.get_dst_line(),
                    token.get_dst_col(),
                    token.get_src_line(),
                    token.get_src_col(),
                    Some(source),
                    token.get_name(),
                );
            }
        }
    }
    builder.into_sourcemap()
}

/// Shift every generated position down by `lines`.
pub fn offset_lines(map: &SourceMap, lines: u32) -> SourceMap {
    if lines == 0 {
        return map.clone();
    }
    let mut builder = SourceMapBuilder::new(map.get_file());
    for token in map.tokens() {
        builder.add(
            token.get_dst_line() + lines,
            token.get_dst_col(),
            token.get_src_line(),
            token.get_src_col(),
            token.get_source(),
            token.get_name(),
        );
    }
    builder.into_sourcemap()
}

/// Serialize the final map without source contents and with the
/// source root pointing at the parent of the output directory.
pub fn finalize(map: &SourceMap, outfile: &Path) -> Result<String> {
    let mut buf = Vec::new();
    map.to_writer(&mut buf).map_err(PackageError::minify)?;
    let mut json: serde_json::Value =
        serde_json::from_slice(&buf).map_err(PackageError::minify)?;
    if let Some(obj) = json.as_object_mut() {
        obj.remove("sourcesContent");
        obj.insert("sourceRoot".into(), "..".into());
        if let Some(file) = outfile.file_name() {
            obj.insert("file".into(), file.to_string_lossy().into_owned().into());
        }
    }
    Ok(json.to_string())
}

/// The `sourceMappingURL` comment for `map`.
///
/// Returns the comment and whether the map still needs to be written
/// next to the output.
pub fn mapping_url_comment(
    map: &str,
    inline: bool,
    sourcemap_file: Option<&str>,
    outfile: &Path,
) -> (String, bool) {
    let url = if inline {
        format!(
            "data:application/json;charset=utf-8;base64,{}",
            base64::prelude::BASE64_STANDARD.encode(map.as_bytes())
        )
    } else if let Some(file) = sourcemap_file {
        file.to_string()
    } else {
        map_file_name(outfile)
    };
    (format!("\n//# sourceMappingURL={}\n", url), !inline)
}

/// `<outfile>.map` with the directory stripped.
pub fn map_file_name(outfile: &Path) -> String {
    let name = outfile
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}.map", name)
}

/// Path the side map file is written to.
pub fn map_path(outfile: &Path) -> std::path::PathBuf {
    let mut path = outfile.as_os_str().to_owned();
    path.push(".map");
    path.into()
}
