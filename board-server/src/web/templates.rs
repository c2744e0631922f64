//! Askama templates for the web frontend.

use askama::Template;
use chrono::DateTime;

use crate::boards::{BoardDocument, BoardItem, BoardLine};

// ============================================================================
// Page Templates (extend base.html)
// ============================================================================

/// Index of configured boards.
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub boards: Vec<BoardLink>,
}

/// One board rendered server-side; refreshed live by `board.js`.
#[derive(Template)]
#[template(path = "board.html")]
pub struct BoardTemplate {
    pub board: BoardView,
}

// ============================================================================
// View Models (for templates)
// ============================================================================

/// Link to a board on the index page.
#[derive(Debug, Clone)]
pub struct BoardLink {
    pub id: String,
    pub title: String,
}

/// Board view model.
#[derive(Debug, Clone)]
pub struct BoardView {
    pub id: String,
    pub title: String,
    /// Build time as `HH:MM:SS` (UTC).
    pub generated: String,
    pub items: Vec<ItemView>,
}

impl BoardView {
    pub fn from_document(doc: &BoardDocument) -> Self {
        let generated = DateTime::from_timestamp(doc.generated_at, 0)
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_default();

        Self {
            id: doc.id.clone(),
            title: doc.title.clone(),
            generated,
            items: doc.items.iter().map(ItemView::from_item).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Board item view model.
#[derive(Debug, Clone)]
pub struct ItemView {
    pub title: String,
    /// Stop name when it differs from the title
    pub stop_name: Option<String>,
    pub platform: Option<String>,
    pub lines: Vec<LineView>,
}

impl ItemView {
    pub fn from_item(item: &BoardItem) -> Self {
        let stop_name = (item.name != item.title && !item.name.is_empty()).then(|| item.name.clone());

        Self {
            title: item.title.clone(),
            stop_name,
            platform: item.platform.clone().filter(|p| !p.is_empty()),
            lines: item.lines.iter().map(LineView::from_line).collect(),
        }
    }
}

/// Line view model.
#[derive(Debug, Clone)]
pub struct LineView {
    pub name: String,
    /// Line rule title, else the destination
    pub label: String,
    pub kind: String,
    pub countdown_text: String,
}

impl LineView {
    pub fn from_line(line: &BoardLine) -> Self {
        let label = line
            .title
            .clone()
            .or_else(|| line.towards.clone())
            .unwrap_or_default();

        Self {
            name: line.name.clone().unwrap_or_default(),
            label,
            kind: line.kind.clone().unwrap_or_default(),
            countdown_text: line.countdown_text.clone(),
        }
    }

    /// Whether any departure is known.
    pub fn has_departures(&self) -> bool {
        !self.countdown_text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn line(title: Option<&str>, towards: Option<&str>) -> BoardLine {
        BoardLine {
            name: Some("25".into()),
            kind: Some("ptTram".into()),
            towards: towards.map(String::from),
            title: title.map(String::from),
            departures: vec![],
            countdown_text: String::new(),
        }
    }

    #[test]
    fn line_label_prefers_rule_title() {
        assert_eq!(LineView::from_line(&line(Some("Floridsdorf"), Some("Floridsdorf U"))).label, "Floridsdorf");
        assert_eq!(LineView::from_line(&line(None, Some("Floridsdorf U"))).label, "Floridsdorf U");
        assert_eq!(LineView::from_line(&line(None, None)).label, "");
        assert!(!LineView::from_line(&line(None, None)).has_departures());
    }

    #[test]
    fn item_shows_stop_name_only_when_retitled() {
        let mut item = BoardItem {
            municipality: None,
            platform: Some(String::new()),
            rbl: None,
            name: "Josef-Baumann-Gasse".into(),
            title: "JB (Süd)".into(),
            lines: vec![],
            traffic_info_categories: json!([]),
            traffic_infos: json!({}),
        };
        let view = ItemView::from_item(&item);
        assert_eq!(view.stop_name.as_deref(), Some("Josef-Baumann-Gasse"));
        assert_eq!(view.platform, None);

        item.title = item.name.clone();
        assert_eq!(ItemView::from_item(&item).stop_name, None);
    }

    #[test]
    fn board_view_formats_build_time() {
        let doc = BoardDocument::empty("vz", 3_723);
        let view = BoardView::from_document(&doc);
        assert_eq!(view.generated, "01:02:03");
        assert!(view.is_empty());
    }

    #[test]
    fn board_page_renders() {
        let mut doc = BoardDocument::empty("vz", 0);
        doc.items.push(BoardItem {
            municipality: None,
            platform: Some("2".into()),
            rbl: None,
            name: "Kagran".into(),
            title: "Kagran <U1>".into(),
            lines: vec![BoardLine {
                countdown_text: "17".into(),
                ..line(None, Some("Leopoldau"))
            }],
            traffic_info_categories: json!([]),
            traffic_infos: json!({}),
        });

        let html = BoardTemplate {
            board: BoardView::from_document(&doc),
        }
        .render()
        .unwrap();

        assert!(html.contains("Kagran &lt;U1&gt;"));
        assert!(html.contains(">17<"));
        assert!(html.contains("Leopoldau"));
        assert!(html.contains(r#"data-board="vz""#));
    }
}
