//! Email rendering: merge tags and tracked asset links.
//!
//! Templates are rendered with minijinja. Merge tags are `{{firstName}}`,
//! `{{lastName}}` and `{{email}}`. Asset references are `{{<kind>:<id>}}`
//! with kind one of `link`, `funnel`, `presskit` or `landing`; they are
//! rewritten to tracked redirect URLs of the form
//! `{base}/r/{kind}/{id}?fan={fan_id}`.

use crate::contact::Fan;
use crate::provider::{Asset, AssetKind};
use encore_core::FanId;
use minijinja::{AutoEscape, Environment, Value, context};

/// An asset reference found in markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReference {
    pub kind: AssetKind,
    pub id: String,
    /// The literal reference, braces included.
    pub placeholder: String,
}

/// Lists the distinct asset references in `markup`, in order of first appearance.
#[must_use]
pub fn asset_references(markup: &str) -> Vec<AssetReference> {
    let mut found: Vec<AssetReference> = Vec::new();
    let mut rest = markup;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        let inner = &after[..end];
        if let Some(reference) = parse_reference(inner) {
            if !found.iter().any(|r| r.placeholder == reference.placeholder) {
                found.push(reference);
            }
        }
        rest = &after[end + 2..];
    }
    found
}

fn parse_reference(inner: &str) -> Option<AssetReference> {
    let (kind, id) = inner.trim().split_once(':')?;
    let kind = AssetKind::from_str_value(kind)?;
    let valid_id = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid_id.then(|| AssetReference {
        kind,
        id: id.to_string(),
        placeholder: format!("{{{{{inner}}}}}"),
    })
}

/// Builds the tracked redirect URL of an asset for a fan.
#[must_use]
pub fn tracked_url(base_url: &str, kind: AssetKind, asset_id: &str, fan_id: FanId) -> String {
    format!(
        "{}/r/{}/{asset_id}?fan={fan_id}",
        base_url.trim_end_matches('/'),
        kind.as_str()
    )
}

/// Renders merge tags in a subject line.
///
/// # Errors
///
/// Returns an error if the subject is not a valid template.
pub fn render_subject(subject: &str, fan: &Fan) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.render_str(subject, fan_context(fan, Vec::new()))
}

/// Renders merge tags and tracked asset links in an HTML body.
///
/// Fan values are HTML-escaped and emitted literally. References to assets
/// missing from `assets` render as `#`.
///
/// # Errors
///
/// Returns an error if the body is not a valid template.
pub fn render_body(
    body: &str,
    fan: &Fan,
    assets: &[Asset],
    tracking_base_url: &str,
) -> Result<String, minijinja::Error> {
    let mut source = body.to_string();
    let mut urls = Vec::new();
    for (index, reference) in asset_references(body).into_iter().enumerate() {
        let resolved = assets
            .iter()
            .find(|a| a.kind == reference.kind && a.id == reference.id);
        let url = match resolved {
            Some(asset) => tracked_url(tracking_base_url, asset.kind, &asset.id, fan.id),
            None => "#".to_string(),
        };
        urls.push(Value::from_safe_string(url));
        source = source.replace(&reference.placeholder, &format!("{{{{ assets[{index}] }}}}"));
    }

    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    env.render_str(&source, fan_context(fan, urls))
}

fn fan_context(fan: &Fan, assets: Vec<Value>) -> Value {
    context! {
        firstName => fan.first_name.as_deref().unwrap_or_default(),
        lastName => fan.last_name.as_deref().unwrap_or_default(),
        email => &fan.email,
        assets => assets,
    }
}
