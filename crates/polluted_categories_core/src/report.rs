use std::fmt;

use crate::replica::CategoryRow;

pub const REPORT_PAGE_TITLE: &str = "Wikipedia:Database reports/Polluted categories (2)";
pub const EDIT_SUMMARY: &str = "Task 28: Update database report";

/// `~~~~~` expands to the save timestamp, `~~~` to the bot's signature.
pub const REPORT_PREAMBLE: &str = "Categories that contain pages in the (main) namespace and the draft namespaces; data as of <onlyinclude>~~~~~</onlyinclude>. Updated by ~~~.";

const TABLE_OPEN: &str = "{| class=\"wikitable sortable\"";
const TABLE_HEADER: &str = "! Category !! Drafts";
const ROW_SEPARATOR: &str = "|-";
const TABLE_CLOSE: &str = "|}";

const CATEGORY_LINK_PREFIX: &str = "[[:Category:";
const LINK_SUFFIX: &str = "]]";

/// Rows in the order the replica returned them. Rendering never re-sorts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportTable {
    rows: Vec<CategoryRow>,
}

impl ReportTable {
    pub fn new(rows: Vec<CategoryRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[CategoryRow] {
        &self.rows
    }
}

impl fmt::Display for ReportTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{TABLE_OPEN}")?;
        writeln!(f, "{TABLE_HEADER}")?;
        for row in &self.rows {
            writeln!(f, "{ROW_SEPARATOR}")?;
            writeln!(f, "| {} || {}", category_link(&row.name), row.members)?;
        }
        write!(f, "{TABLE_CLOSE}")
    }
}

/// Colon-prefixed link so the report links to the category instead of joining it.
pub fn category_link(name: &str) -> String {
    let display = name.replace('_', " ");
    let mut link =
        String::with_capacity(CATEGORY_LINK_PREFIX.len() + display.len() + LINK_SUFFIX.len());
    link.push_str(CATEGORY_LINK_PREFIX);
    link.push_str(&display);
    link.push_str(LINK_SUFFIX);
    link
}

/// Full replacement text for the report page plus the edit metadata used to save it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPage {
    pub title: String,
    pub text: String,
    pub summary: String,
    pub minor: bool,
}

impl ReportPage {
    pub fn compose(table: &ReportTable) -> Self {
        Self {
            title: REPORT_PAGE_TITLE.to_string(),
            text: format!("{REPORT_PREAMBLE}\n\n{table}"),
            summary: EDIT_SUMMARY.to_string(),
            minor: false,
        }
    }
}
