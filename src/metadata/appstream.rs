//! AppStream metadata extraction.
//!
//! Well-formedness is left to `appstreamcli`; this module only pulls out the
//! elements the pipeline cross-checks.

use regex::Regex;
use std::sync::LazyLock;

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(/?)([A-Za-z][\w:.-]*)[^>]*?(/?)>").expect("static regex"));
static LAUNCHABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<launchable[^>]*\btype="([^"]+)"[^>]*>(.*?)</launchable>"#).expect("static regex")
});
static ICON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<icon[^>]*\btype="([^"]+)"[^>]*>(.*?)</icon>"#).expect("static regex")
});
static COMPONENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<component(?:\s[^>]*)?>").expect("static regex"));

/// A `type`-tagged element value (`<icon type="stock">name</icon>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedValue {
    /// `type` attribute
    pub kind: String,
    /// Element text, trimmed
    pub value: String,
}

/// Elements of an AppStream component relevant to packaging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppStreamMetadata {
    /// Raw `<id>` text, untrimmed
    pub id: Option<String>,
    /// `<launchable>` elements
    pub launchables: Vec<TypedValue>,
    /// `<icon>` elements
    pub icons: Vec<TypedValue>,
}

impl AppStreamMetadata {
    /// Extract metadata from XML text
    pub fn parse(content: &str) -> Result<Self, String> {
        let content = COMMENT.replace_all(content, "");
        if !COMPONENT.is_match(&content) {
            return Err("no <component> element".to_string());
        }

        let id = component_id(&content);
        let collect = |re: &Regex| {
            re.captures_iter(&content)
                .map(|c| TypedValue {
                    kind: c[1].to_string(),
                    value: c[2].trim().to_string(),
                })
                .collect::<Vec<_>>()
        };

        Ok(Self {
            id,
            launchables: collect(&LAUNCHABLE),
            icons: collect(&ICON),
        })
    }

    /// Values of `<launchable type="desktop-id">`
    pub fn desktop_launchables(&self) -> impl Iterator<Item = &str> {
        self.launchables
            .iter()
            .filter(|l| l.kind == "desktop-id")
            .map(|l| l.value.as_str())
    }

    /// Icons of the given `type`
    pub fn icons_of(&self, kind: &str) -> impl Iterator<Item = &str> {
        self.icons
            .iter()
            .filter(move |i| i.kind == kind)
            .map(|i| i.value.as_str())
    }
}

/// Text of the `<id>` that is a direct child of the first `<component>`.
///
/// `<id>` elements nested deeper (`<provides>`, `<requires>`, ...) name other
/// components and are skipped.
fn component_id(content: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut component_depth = None;
    for tag in TAG.captures_iter(content) {
        let name = &tag[2];
        let self_closing = !tag[3].is_empty();
        if !tag[1].is_empty() {
            depth = depth.saturating_sub(1);
            if component_depth == Some(depth) {
                return None;
            }
            continue;
        }
        if name == "id" && !self_closing && component_depth.is_some_and(|d| depth == d + 1) {
            let start = tag.get(0)?.end();
            let len = content[start..].find("</id>")?;
            return Some(content[start..start + len].to_string());
        }
        if name == "component" && component_depth.is_none() {
            component_depth = Some(depth);
        }
        if !self_closing {
            depth += 1;
        }
    }
    None
}
