//! Per-request frame transforms
//!
//! Viewers asking for the same transforms of the same stream share one
//! [`TransformPipeline`], looked up by its signature in the
//! [`PipelineRegistry`]. The pipeline caches its last output, so N viewers
//! cost one decode/transform/encode per frame.

pub mod ops;
pub mod pipeline;
pub mod registry;

pub use ops::TransformOp;
pub use pipeline::TransformPipeline;
pub use registry::PipelineRegistry;

use crate::params::RequestParams;

/// Canonical key a request parameter contributes to, if any
fn canonical_key(key: &str) -> Option<&'static str> {
    let canonical = match key {
        "size" | "w" | "width" | "h" | "height" | "keepRatio" => "size",
        "rotate" => "rotate",
        "crop" => "crop",
        "barrel" => "barrel",
        "perspective" => "perspective",
        "quality" | "q" => "quality",
        "timestamp" | "ts" => "timestamp",
        "sequence" | "seq" => "sequence",
        _ => return None,
    };
    Some(canonical)
}

fn canonical_value(key: &str, params: &RequestParams) -> Option<String> {
    match key {
        "size" => {
            let mut value = match params.get("size") {
                Some(size) => size.trim().to_string(),
                None => {
                    let w = params.get_any(&["width", "w"]);
                    let h = params.get_any(&["height", "h"]);
                    if w.is_none() && h.is_none() {
                        return None;
                    }
                    format!("{}x{}", w.unwrap_or("").trim(), h.unwrap_or("").trim())
                }
            };
            if params.flag(&["keepRatio"]) && !value.contains(',') {
                value.push_str(",keepRatio");
            }
            Some(value)
        }
        "rotate" => {
            let value = params.get("rotate")?.trim();
            let (angle, suffix) = match value.find(',') {
                Some(comma) => (value[..comma].trim(), &value[comma..]),
                None => (value, ""),
            };

            // `rad` belongs to the angle, ahead of any `,clip`
            let mut value = angle.to_string();
            if params.flag(&["rad"]) && !angle.to_ascii_lowercase().ends_with("rad") {
                value.push_str("rad");
            }
            value.push_str(suffix);
            if params.flag(&["clip"]) && suffix.is_empty() {
                value.push_str(",clip");
            }
            Some(value)
        }
        "quality" => params.get_any(&["quality", "q"]).map(str::to_string),
        "timestamp" => params.get_any(&["timestamp", "ts"]).map(str::to_string),
        "sequence" => params.get_any(&["sequence", "seq"]).map(str::to_string),
        other => params.get(other).map(str::to_string),
    }
}

/// Transform-relevant parameters of a request, canonicalised, in request order
///
/// Aliases are folded into their canonical key (`w`/`h` into `size`, `q`
/// into `quality`, ...); everything that does not configure a transform is
/// dropped. Two requests share a pipeline exactly when their signatures are
/// equal.
pub fn signature(params: &RequestParams) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();

    for (key, _) in params.iter() {
        let Some(canonical) = canonical_key(key) else {
            continue;
        };
        if out.iter().any(|(k, _)| k == canonical) {
            continue;
        }
        if let Some(value) = canonical_value(canonical, params) {
            out.push((canonical.to_string(), value));
        }
    }

    out
}
