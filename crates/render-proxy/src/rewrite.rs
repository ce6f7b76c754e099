//! Text-level rewriting of root-relative references.
//!
//! The document is never parsed into a tree. A root-relative reference
//! is any run that starts with `/` right after a `"`, `'` or space and
//! extends up to the next `"`, `'` or `>`. This also matches inside plain
//! text that happens to contain ` /something`; such false positives are
//! rewritten like real references. Only `srcset` removal looks at tag
//! structure.
//!
//! Two passes exist and the pipeline applies each exactly once: the
//! absolute pass (prefix with the target origin, collecting every matched
//! reference for mirroring) and then the local pass (prefix with the
//! asset-serving path). Neither pass is idempotent.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::types::AssetReference;

/// Appended to every served document so the proxied page cannot write to
/// the embedding caller's console or surface its script errors.
pub const INSTRUMENTATION_SCRIPT: &str = r#"<script>
      window.console.log = function() {};
      window.console.warn = function() {};
      window.console.error = function() {};
      window.onerror = function() { return true; };
      window.addEventListener('error', function(e) { e.stopImmediatePropagation(); e.preventDefault(); return false; }, true);
      window.addEventListener('unhandledrejection', function(e) { e.preventDefault(); }, true);
    </script>"#;

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(["' ])(/[^"'>]+)"#).expect("reference regex is valid"))
}

/// An attribute value: quoted (possibly unterminated before `>`) or bare.
const ATTR_VALUE: &str = r#"(?:"[^"]*"|"[^">]*|'[^']*'|'[^'>]*|[^\s"'>]*)"#;

/// Start tags, plus the raw-text regions whose content is not markup.
fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(
            r#"(?is)(<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<!--.*?-->)|<[a-z][^\s"'/>]*(?:\s+[^\s"'>/=]+(?:\s*=\s*{ATTR_VALUE})?)*\s*/?>"#
        );
        Regex::new(&pattern).expect("tag regex is valid")
    })
}

/// One attribute inside a start tag, with its leading whitespace.
fn attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(r#"\s+([^\s"'>/=]+)(?:\s*=\s*{ATTR_VALUE})?"#);
        Regex::new(&pattern).expect("attribute regex is valid")
    })
}

/// Remove every `srcset` attribute, whatever its value looks like.
///
/// Only attributes of start tags are touched. Script and style bodies,
/// comments, text and other attributes' values keep the word intact.
pub fn strip_srcset(html: &str) -> String {
    tag_re()
        .replace_all(html, |caps: &Captures| {
            let tag = &caps[0];
            if caps.get(1).is_some() {
                return tag.to_string();
            }
            attribute_re()
                .replace_all(tag, |attr: &Captures| {
                    if attr[1].eq_ignore_ascii_case("srcset") {
                        String::new()
                    } else {
                        attr[0].to_string()
                    }
                })
                .into_owned()
        })
        .into_owned()
}

/// Prefix every root-relative reference with `base`, keeping the
/// delimiter that preceded it. Strips `srcset` first.
pub fn rewrite(html: &str, base: &str) -> String {
    let stripped = strip_srcset(html);
    reference_re()
        .replace_all(&stripped, |caps: &Captures| {
            format!("{}{}{}", &caps[1], base, &caps[2])
        })
        .into_owned()
}

/// Absolute pass: prefix references with `origin` and return the
/// distinct references that were rewritten, in first-seen order.
pub fn rewrite_absolute(html: &str, origin: &str) -> (String, Vec<AssetReference>) {
    let stripped = strip_srcset(html);
    let mut seen = HashSet::new();
    let mut discovered = Vec::new();

    let rewritten = reference_re()
        .replace_all(&stripped, |caps: &Captures| {
            let raw = &caps[2];
            if seen.insert(raw.to_string()) {
                discovered.push(AssetReference::new(raw));
            }
            format!("{}{}{}", &caps[1], origin, raw)
        })
        .into_owned();

    (rewritten, discovered)
}

/// Local pass: prefix references with the asset-serving path.
pub fn rewrite_local(html: &str, asset_prefix: &str) -> String {
    rewrite(html, asset_prefix)
}

/// Append the console/error suppression script.
pub fn inject_instrumentation(mut html: String) -> String {
    html.push_str(INSTRUMENTATION_SCRIPT);
    html
}
