//! Built-in filter step implementations.
//!
//! Each function is a pure transform over the asset set: it returns new
//! assets and never touches the filesystem. Shapes: rewrite/wrap/
//! module_register/copy are 1:1, concat and manifest_emit are N:1,
//! compress is 1:1 or 1:2.

use flate2::Compression;
use flate2::write::GzEncoder;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::Write;

use crate::asset::AssetRef;
use crate::error::BuildError;
use crate::order::Orderer;

use super::NameFn;

/// Apply regex find/replace rules to each asset's text content.
pub(super) fn rewrite(
    assets: Vec<AssetRef>,
    rules: &[(Regex, String)],
) -> Result<Vec<AssetRef>, BuildError> {
    assets
        .into_iter()
        .map(|asset| {
            let text = require_text(&asset)?;
            let mut out = text.to_string();
            for (regex, replace) in rules {
                out = regex.replace_all(&out, replace.as_str()).into_owned();
            }
            Ok(asset.with_content(out))
        })
        .collect()
}

/// Inject a prefix/suffix envelope around each asset.
pub(super) fn wrap(
    assets: Vec<AssetRef>,
    prefix: &str,
    suffix: &str,
    source_maps: bool,
) -> Result<Vec<AssetRef>, BuildError> {
    Ok(assets
        .into_iter()
        .map(|asset| {
            let mut content = Vec::with_capacity(prefix.len() + asset.content().len() + suffix.len());
            content.extend_from_slice(prefix.as_bytes());
            content.extend_from_slice(asset.content());
            content.extend_from_slice(suffix.as_bytes());

            let wrapped = asset.with_content(content);
            if source_maps {
                // Minimal map: the envelope only shifts lines, so recording
                // the prefix line offset is enough for consumers to adjust.
                let offset = prefix.matches('\n').count();
                let map = format!(
                    r#"{{"version":3,"file":"{}","lineOffset":{offset},"mappings":""}}"#,
                    wrapped.path()
                );
                wrapped.with_meta("source_map", map)
            } else {
                wrapped
            }
        })
        .collect())
}

/// Assign each asset a module id and wrap it in a registration envelope.
pub(super) fn module_register(
    assets: Vec<AssetRef>,
    id_fn: &NameFn,
) -> Result<Vec<AssetRef>, BuildError> {
    assets
        .into_iter()
        .map(|asset| {
            let text = require_text(&asset)?;
            let id = id_fn.apply(asset.path());
            let envelope = format!(
                "__register(\"{id}\", function(module, exports) {{\n{text}\n}});\n"
            );
            Ok(asset.with_content(envelope).with_meta("module_id", id))
        })
        .collect()
}

/// Merge all assets into one, in Orderer-resolved order.
pub(super) fn concat(
    assets: Vec<AssetRef>,
    orderer: &Orderer,
    output: &str,
    required: bool,
    join: &[u8],
) -> Result<Vec<AssetRef>, BuildError> {
    if required {
        let paths: Vec<&str> = assets.iter().map(|a| a.path()).collect();
        if let Some(missing) = orderer.missing_from(&paths).first() {
            return Err(BuildError::MissingInput {
                file: (*missing).to_string(),
            });
        }
    }

    let ordered = orderer.arrange(assets);
    let sources: Vec<&str> = ordered.iter().map(|a| a.path()).collect();
    let sources = sources.join(",");

    let mut content = Vec::new();
    for (i, asset) in ordered.iter().enumerate() {
        if i > 0 {
            content.extend_from_slice(join);
        }
        content.extend_from_slice(asset.content());
    }

    Ok(vec![
        AssetRef::new(output, content).with_meta("concat_sources", sources),
    ])
}

/// Pass assets through, optionally renaming.
pub(super) fn copy(
    assets: Vec<AssetRef>,
    rename: Option<&NameFn>,
) -> Result<Vec<AssetRef>, BuildError> {
    Ok(assets
        .into_iter()
        .map(|asset| match rename {
            Some(f) => {
                let renamed = f.apply(asset.path());
                asset.with_path(renamed)
            }
            None => asset,
        })
        .collect())
}

/// Gzip each asset, alongside or replacing the original.
pub(super) fn compress(
    assets: Vec<AssetRef>,
    keep_original: bool,
    level: u32,
) -> Result<Vec<AssetRef>, BuildError> {
    let mut out = Vec::with_capacity(if keep_original { assets.len() * 2 } else { assets.len() });
    for asset in assets {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
        let gz = encoder
            .write_all(asset.content())
            .and_then(|()| encoder.finish())
            .map_err(|e| BuildError::io(asset.path(), e))?;
        let gz_asset = AssetRef::new(format!("{}.gz", asset.path()), gz);
        if keep_original {
            out.push(asset);
        }
        out.push(gz_asset);
    }
    Ok(out)
}

/// Emit a single JSON manifest of all input assets' content hashes.
pub(super) fn manifest_emit(
    assets: Vec<AssetRef>,
    output: &str,
) -> Result<Vec<AssetRef>, BuildError> {
    let entries: BTreeMap<&str, String> = assets
        .iter()
        .map(|a| (a.path(), a.content_hash().to_hex()))
        .collect();

    let json = serde_json::to_vec_pretty(&entries).map_err(|e| {
        BuildError::compile(output, format!("manifest serialization failed: {e}"))
    })?;

    Ok(vec![AssetRef::new(output, json)])
}

fn require_text(asset: &AssetRef) -> Result<&str, BuildError> {
    asset
        .text()
        .ok_or_else(|| BuildError::compile(asset.path(), "content is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn asset(path: &str, content: &str) -> AssetRef {
        AssetRef::new(path, content)
    }

    #[test]
    fn test_rewrite_applies_rules_in_order() {
        let rules = vec![
            (Regex::new("require\\(\"(\\w+)\"\\)").unwrap(), "load(\"$1\")".to_string()),
            (Regex::new("load").unwrap(), "fetch".to_string()),
        ];
        let out = rewrite(vec![asset("a.js", "require(\"fs\")")], &rules).unwrap();
        assert_eq!(out[0].text().unwrap(), "fetch(\"fs\")");
    }

    #[test]
    fn test_rewrite_rejects_binary() {
        let rules = vec![(Regex::new("x").unwrap(), "y".to_string())];
        let err = rewrite(vec![AssetRef::new("a.bin", vec![0xff])], &rules).unwrap_err();
        assert!(matches!(err, BuildError::Compile { .. }));
    }

    #[test]
    fn test_wrap_envelope() {
        let out = wrap(
            vec![asset("a.js", "body")],
            "(function() {\n",
            "\n})();",
            true,
        )
        .unwrap();
        assert_eq!(out[0].text().unwrap(), "(function() {\nbody\n})();");
        assert!(out[0].meta().get("source_map").unwrap().contains("\"lineOffset\":1"));
    }

    #[test]
    fn test_module_register_derives_id() {
        let id_fn = NameFn::module_id("app", None);
        let out = module_register(vec![asset("models/user.js", "var x;")], &id_fn).unwrap();
        assert_eq!(out[0].meta().get("module_id").unwrap(), "app/models/user");
        assert!(out[0].text().unwrap().starts_with("__register(\"app/models/user\""));
    }

    #[test]
    fn test_concat_end_to_end_scenario() {
        // vendor/a.js (explicit) then lib/b.js (remainder, alphabetical)
        let orderer = Orderer::new(vec!["a.js".into()], vec![]);
        let out = concat(
            vec![asset("lib/b.js", "B"), asset("vendor/a.js", "A")],
            &orderer,
            "bundle.js",
            false,
            b"\n",
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path(), "bundle.js");
        assert_eq!(out[0].text().unwrap(), "A\nB");
    }

    #[test]
    fn test_concat_required_missing() {
        let orderer = Orderer::new(vec!["boot.js".into()], vec![]);
        let err = concat(vec![asset("a.js", "A")], &orderer, "all.js", true, b"\n").unwrap_err();
        match err {
            BuildError::MissingInput { file } => assert_eq!(file, "boot.js"),
            other => panic!("expected missing input, got {other:?}"),
        }
    }

    #[test]
    fn test_concat_optional_missing_is_skipped() {
        let orderer = Orderer::new(vec!["boot.js".into()], vec![]);
        let out = concat(vec![asset("a.js", "A")], &orderer, "all.js", false, b"\n").unwrap();
        assert_eq!(out[0].text().unwrap(), "A");
    }

    #[test]
    fn test_copy_rename() {
        let spec = crate::config::RenameSpec {
            strip_prefix: None,
            add_prefix: Some("static/".into()),
            extension: None,
        };
        let rename = NameFn::rename(&spec);
        let out = copy(vec![asset("logo.svg", "<svg/>")], Some(&rename)).unwrap();
        assert_eq!(out[0].path(), "static/logo.svg");
        assert_eq!(out[0].content(), b"<svg/>");
    }

    #[test]
    fn test_compress_alongside() {
        let out = compress(vec![asset("app.js", "var x = 1;")], true, 6).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].path(), "app.js");
        assert_eq!(out[1].path(), "app.js.gz");

        // Round-trip through flate2's decoder
        let mut decoder = flate2::read::GzDecoder::new(out[1].content());
        let mut decoded = String::new();
        decoder.read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, "var x = 1;");
    }

    #[test]
    fn test_compress_replacing() {
        let out = compress(vec![asset("app.js", "x")], false, 6).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path(), "app.js.gz");
    }

    #[test]
    fn test_compress_is_deterministic() {
        // Gzip output must not embed timestamps
        let a = compress(vec![asset("app.js", "same input")], false, 6).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = compress(vec![asset("app.js", "same input")], false, 6).unwrap();
        assert_eq!(a[0].content(), b[0].content());
    }

    #[test]
    fn test_manifest_emit() {
        let out = manifest_emit(
            vec![asset("a.js", "A"), asset("b.css", "B")],
            "manifest.json",
        )
        .unwrap();
        assert_eq!(out.len(), 1);

        let parsed: BTreeMap<String, String> =
            serde_json::from_slice(out[0].content()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(
            parsed.get("a.js").unwrap(),
            &crate::cache::ContentHash::of(b"A").to_hex()
        );
    }
}
