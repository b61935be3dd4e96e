//! The template store: every regular file directly under the templates
//! directory, loaded once at startup and keyed by basename. Rendering is
//! single-pass placeholder substitution into the `base.html` shell.

use crate::{errors::StartupError, router::ViewRoute};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// The page shell every view is composed into.
pub(crate) const BASE_TEMPLATE: &str = "base.html";

/// The placeholders, in the order they are substituted. Only the first
/// occurrence of each is replaced, and substitution is not recursive:
/// placeholder text inside substituted content is emitted verbatim.
const PLACEHOLDERS: [&str; 4] = ["{{title}}", "{{page_content}}", "{{extra_head}}", "{{extra_js}}"];

pub(crate) struct TemplateStore {
    map: HashMap<String, Vec<u8>>,
}

impl TemplateStore {
    /// Loads the store. Subdirectories are skipped; an unreadable file or
    /// an empty template directory aborts startup.
    pub(crate) fn load(dir: &Path) -> Result<Self, StartupError> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            StartupError::Templates(format!("cannot read {}: {e}", dir.display()))
        })?;

        let mut map = HashMap::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| StartupError::Templates(format!("{}: {e}", dir.display())))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let bytes = std::fs::read(&path).map_err(|e| {
                StartupError::Templates(format!("cannot read {}: {e}", path.display()))
            })?;
            debug!(template = name, bytes = bytes.len(), "template loaded");
            map.insert(name.to_string(), bytes);
        }

        if map.is_empty() {
            return Err(StartupError::Templates(format!(
                "no templates under {}",
                dir.display()
            )));
        }

        Ok(Self { map })
    }

    pub(crate) fn get(&self, name: &str) -> Option<&[u8]> {
        self.map.get(name).map(Vec::as_slice)
    }

    fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Composes a view: the base shell with title, page content and the
    /// optional fragments substituted in. Missing fragment files render as
    /// empty; a missing page template is an error the caller turns into a
    /// fallback render or a 500.
    pub(crate) fn render_view(&self, view: &ViewRoute) -> Option<String> {
        let base = self.get_str(BASE_TEMPLATE)?;
        let page = self.get_str(view.page)?;
        let head = view.extra_head.and_then(|n| self.get_str(n)).unwrap_or("");
        let js = view.extra_js.and_then(|n| self.get_str(n)).unwrap_or("");

        Some(compose(base, [view.title, page, head, js]))
    }
}

/// Single-pass substitution: the first occurrence of each placeholder in
/// the original shell is located up front, then the output is assembled
/// from the shell segments and the values. Values are never re-scanned.
fn compose(base: &str, values: [&str; 4]) -> String {
    let mut found: Vec<(usize, usize, &str)> = PLACEHOLDERS
        .iter()
        .zip(values)
        .filter_map(|(ph, value)| base.find(ph).map(|pos| (pos, ph.len(), value)))
        .collect();
    found.sort_unstable_by_key(|&(pos, ..)| pos);

    let extra: usize = found.iter().map(|&(.., v)| v.len()).sum();
    let mut out = String::with_capacity(base.len() + extra);

    let mut cursor = 0;
    for (pos, ph_len, value) in found {
        // Overlapping placeholder text is impossible: the markers share no
        // prefix, and each is located in the untouched shell.
        out.push_str(&base[cursor..pos]);
        out.push_str(value);
        cursor = pos + ph_len;
    }
    out.push_str(&base[cursor..]);
    out
}

#[cfg(test)]
mod store_tests {
    use super::*;

    fn store(files: &[(&str, &str)]) -> TemplateStore {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        TemplateStore::load(dir.path()).unwrap()
    }

    #[test]
    fn loads_regular_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base.html"), "shell").unwrap();
        std::fs::create_dir(dir.path().join("partials")).unwrap();
        std::fs::write(dir.path().join("partials").join("x.html"), "nested").unwrap();

        let store = TemplateStore::load(dir.path()).unwrap();
        assert_eq!(store.get("base.html"), Some(b"shell".as_ref()));
        assert_eq!(store.get("x.html"), None);
    }

    #[test]
    fn empty_directory_aborts() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TemplateStore::load(dir.path()).is_err());
    }

    #[test]
    fn missing_directory_aborts() {
        assert!(TemplateStore::load(Path::new("/nonexistent/templates")).is_err());
    }

    #[test]
    fn render_substitutes_in_shell_order() {
        let store = store(&[
            (
                "base.html",
                "<title>{{title}}</title>{{extra_head}}<body>{{page_content}}</body>{{extra_js}}",
            ),
            ("page.html", "PAGE"),
            ("head.html", "HEAD"),
            ("js.html", "JS"),
        ]);
        let view = ViewRoute {
            method: crate::http::types::Method::Get,
            path: "/x",
            title: "TITLE",
            page: "page.html",
            extra_head: Some("head.html"),
            extra_js: Some("js.html"),
        };

        assert_eq!(
            store.render_view(&view).unwrap(),
            "<title>TITLE</title>HEAD<body>PAGE</body>JS"
        );
    }

    #[test]
    fn missing_fragments_render_empty() {
        let store = store(&[
            ("base.html", "[{{title}}|{{page_content}}|{{extra_head}}|{{extra_js}}]"),
            ("page.html", "P"),
        ]);
        let view = ViewRoute {
            method: crate::http::types::Method::Get,
            path: "/x",
            title: "T",
            page: "page.html",
            extra_head: Some("nope.html"),
            extra_js: None,
        };

        assert_eq!(store.render_view(&view).unwrap(), "[T|P||]");
    }

    #[test]
    fn missing_page_template_is_none() {
        let store = store(&[("base.html", "{{page_content}}")]);
        let view = ViewRoute {
            method: crate::http::types::Method::Get,
            path: "/x",
            title: "T",
            page: "absent.html",
            extra_head: None,
            extra_js: None,
        };
        assert!(store.render_view(&view).is_none());
    }
}

#[cfg(test)]
mod compose_tests {
    use super::*;

    #[test]
    fn substitution_is_not_recursive() {
        // Placeholder text arriving via a value must be emitted verbatim.
        let out = compose(
            "A{{title}}B{{page_content}}C",
            ["{{page_content}}", "{{title}}", "", ""],
        );
        assert_eq!(out, "A{{page_content}}B{{title}}C");
    }

    #[test]
    fn only_first_occurrence_is_replaced() {
        let out = compose("{{title}} and {{title}}", ["X", "", "", ""]);
        assert_eq!(out, "X and {{title}}");
    }

    #[test]
    fn absent_placeholders_add_nothing() {
        let out = compose("static shell", ["T", "P", "H", "J"]);
        assert_eq!(out, "static shell");
    }

    #[test]
    fn values_appear_in_shell_order() {
        // The shell decides ordering, not the substitution sequence.
        let out = compose(
            "{{extra_js}}|{{title}}",
            ["T", "unused-page", "unused-head", "J"],
        );
        assert_eq!(out, "J|T");
    }
}
