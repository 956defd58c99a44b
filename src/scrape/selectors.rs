//! CSS selectors for the portal's markup.

/// Username/email field on the identity provider's form.
pub const USERNAME_INPUT: &str =
    r#"input[name="email"], input[type="email"], input[name="username"]"#;

/// Password field on the identity provider's form.
pub const PASSWORD_INPUT: &str = r#"input[name="password"], input[type="password"]"#;

pub const BUTTON: &str = "button";
pub const SUBMIT_BUTTON: &str = r#"button[type="submit"]"#;
pub const LINK: &str = "a";
pub const TAB: &str = r#"[role="tab"]"#;

/// Body of an AG Grid instance; the dashboard renders more than one.
pub const GRID_CONTAINER: &str = ".ag-center-cols-container";
pub const GRID_ROW: &str = ".ag-row";

/// Attribute on each grid row carrying the invoice id.
pub const GRID_ROW_ID_ATTR: &str = "row-id";

pub const PAGINATION: &str = ".pagination-container";
pub const PAGE_INPUT: &str = ".textbox-pagenumber";

pub const TABLE: &str = "table";
pub const TABLE_ROW: &str = "tr";
pub const TABLE_CELL: &str = "td";
pub const STATEMENT_LINK: &str = "a[href*='StatementId']";

/// A grid cell by its stable column id.
pub fn grid_cell(col_id: &str) -> String {
    format!(".ag-cell[col-id='{col_id}']")
}

/// Any rendered grid row that has a cell in `col_id`.
pub fn grid_row_with_column(col_id: &str) -> String {
    format!("{GRID_ROW} {}", grid_cell(col_id))
}
