//! Conventional names used by the target service-desk application.
//!
//! None of these are guaranteed stable; every consumer pairs them with a
//! content-based fallback.

use crate::selector::Selector;

pub const DEFAULT_BASE_URL: &str = "http://servicedesk-web.int.ttc.ca/CAisd/pdmweb.exe";
pub const DEFAULT_ASSIGNEE: &str = "Couto, Lucas";
pub const DEFAULT_TICKET_TYPE: &str = "go_cr";
pub const DEFAULT_TASKS: [&str; 2] = ["200", "250"];

// Search form
pub const SEARCH_INPUT: &str = "input[name=\"searchKey\"]";
pub const TICKET_TYPE_SELECT: &str = "#ticket_type";
pub const GO_BUTTON: &str = "a#imgBtn0, a[name=\"imgBtn0\"]";

// Ticket popup
pub const ACCORDION: &str = "h2#accrdnHyprlnk1, #accrdnHyprlnk1";
pub const ACCORDION_ID: &str = "#accrdnHyprlnk1";
pub const ACCORDION_TEXT: &str = "Additional Information";
pub const WORKFLOW_TAB: &str = "a#tabHyprlnk1_5";
pub const WORKFLOW_TAB_ID: &str = "#tabHyprlnk1_5";
pub const WORKFLOW_TAB_TEXT: &str = "Workflow Tasks";
pub const ACTIVE_TAB_CLASS: &str = "current";
pub const WORKFLOW_FRAME_NAME: &str = "accTab_5_crro_nb_int_iframe_0";
pub const WORKFLOW_FRAME_URL_MARKER: &str = "FACTORY=cr_wf";

// Task list
pub const RECORD_ANCHOR: &str = "a.record";
pub const GRID_FIRST_COLUMN_ANCHOR: &str = "tr.jqgrow td:first-child a";
pub const DO_DEFAULT_ANCHOR: &str = "a[href^=\"javascript:do_default(\"]";
pub const ROW_OPEN_FUNCTION: &str = "do_default";
/// Column of a task row holding its status label.
pub const ROW_STATUS_COLUMN: usize = 5;

// Task detail popup
pub const HEADER_FRAME_NAME: &str = "cai_header";
pub const MAIN_FRAME_NAME: &str = "cai_main";
pub const IGNORED_FRAME_NAME: &str = "gobtn";
pub const ASSIGNEE_INPUT: &str = "input[name=\"assignee_combo_name\"]";
pub const STATUS_SELECT: &str = "select[name=\"SET.status\"]";
pub const COMPLETE_CODE: &str = "COMP";
pub const COMPLETE_LABEL: &str = "Complete";
pub const DETAIL_TITLE: &str = "Workflow Detail";

fn task_anchors_css() -> String {
    format!("{DO_DEFAULT_ANCHOR}, {RECORD_ANCHOR}, {GRID_FIRST_COLUMN_ANCHOR}")
}

/// Any anchor that can represent a task row.
pub fn task_anchors() -> Selector {
    Selector::css(task_anchors_css())
}

/// The task anchor whose trimmed label is exactly `task`, whatever its markup.
pub fn task_anchor_labelled(task: &str) -> Selector {
    Selector::exact_text(task_anchors_css(), task)
}

pub fn accordion_by_text() -> Selector {
    Selector::any([
        Selector::has_text("h2", ACCORDION_TEXT),
        Selector::has_text("a", ACCORDION_TEXT),
    ])
}

pub fn workflow_tab_by_text() -> Selector {
    Selector::has_text("a", WORKFLOW_TAB_TEXT)
}

/// Header button located by its visible label; ids repeat across unrelated controls.
pub fn header_button(label: &str) -> Selector {
    Selector::any([
        Selector::has_text("a.button", label),
        Selector::has_text("a", label),
    ])
}

pub fn edit_or_save_button() -> Selector {
    Selector::any([header_button("Edit"), header_button("Save")])
}

pub fn form_fields() -> Selector {
    Selector::css(format!("{ASSIGNEE_INPUT}, {STATUS_SELECT}"))
}

pub fn detail_title() -> Selector {
    Selector::has_text("h2", DETAIL_TITLE)
}

/// Case-insensitive "pending" marker on a status value or label.
pub fn is_pending(value: &str) -> bool {
    value.to_uppercase().contains("PEND")
}
