//! HTML placeholder substitution.
//!
//! Tokens are already delimiter-wrapped (`{{Name}}`), so substitution is a
//! literal substring rewrite rather than a pattern match.

use std::path::Path;

use tempfile::TempPath;

use crate::error::Result;
use crate::placeholders::PlaceholderMap;

/// Replace every occurrence of each token in `html` with its value.
///
/// Tokens absent from the document are no-ops and all other text is left
/// byte-for-byte unchanged.
pub fn substitute(html: &str, tokens: &PlaceholderMap) -> String {
    let mut output = html.to_string();
    for (token, value) in tokens.iter() {
        if output.contains(token) {
            output = output.replace(token, value);
        }
    }
    output
}

/// Write substituted HTML into `dir` (created if absent) under a unique
/// name. The file is removed when the returned path is dropped or closed.
pub async fn write_substituted(dir: &Path, html: &str) -> Result<TempPath> {
    tokio::fs::create_dir_all(dir).await?;
    let path = tempfile::Builder::new()
        .prefix("substituted-")
        .suffix(".html")
        .tempfile_in(dir)?
        .into_temp_path();
    tokio::fs::write(&path, html).await?;
    log::debug!("Substituted HTML written to {}", path.display());
    Ok(path)
}
