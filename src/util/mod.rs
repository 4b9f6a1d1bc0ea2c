use crate::controls::MenuView;

/// Renders an open menu as text, one entry per line.
///
/// The cursor row is prefixed with `>` and the channel's current binding is marked `*`.
pub fn format_menu(view: &MenuView) -> String {
    if view.entries.is_empty() {
        return "  (no audio targets)".to_string();
    }

    view.entries
        .iter()
        .enumerate()
        .map(|(index, label)| {
            let cursor = if index == view.cursor { '>' } else { ' ' };
            let bound = if view.bound == Some(index) { '*' } else { ' ' };
            format!("{cursor}{bound} {label}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
