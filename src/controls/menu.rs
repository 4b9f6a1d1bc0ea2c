use crate::input::EncoderEvent;
use crate::system::audio::{Target, TargetId};

pub const UNBIND_LABEL: &str = "None";

/// One selectable row of the binding menu.
#[derive(Debug, Clone)]
pub enum MenuEntry {
    /// Leaves the channel unbound.
    Unbind,
    Target(Target),
}

impl MenuEntry {
    pub fn label(&self) -> &str {
        match self {
            Self::Unbind => UNBIND_LABEL,
            Self::Target(target) => &target.label,
        }
    }

    pub fn target(&self) -> Option<&Target> {
        match self {
            Self::Unbind => None,
            Self::Target(target) => Some(target),
        }
    }

    fn is(&self, bound: Option<&TargetId>) -> bool {
        match (self, bound) {
            (Self::Unbind, None) => true,
            (Self::Target(target), Some(id)) => &target.id == id,
            _ => false,
        }
    }
}

/// Entries offered while a channel is being bound, with a wrapping cursor.
///
/// A non-empty target list is preceded by an [`MenuEntry::Unbind`] row. With no
/// targets the menu has no rows at all.
#[derive(Debug, Clone)]
pub struct MenuModel {
    entries: Vec<MenuEntry>,
    cursor: usize,
}

/// What a presentation layer needs to draw an open menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuView {
    pub entries: Vec<String>,
    pub cursor: usize,
    /// Position of the channel's current binding in `entries`, if listed.
    pub bound: Option<usize>,
}

fn build_entries(targets: Vec<Target>) -> Vec<MenuEntry> {
    if targets.is_empty() {
        return Vec::new();
    }
    std::iter::once(MenuEntry::Unbind)
        .chain(targets.into_iter().map(MenuEntry::Target))
        .collect()
}

impl MenuModel {
    /// Starts on the current binding (the unbind row when unbound), otherwise on the first entry.
    pub fn new(targets: Vec<Target>, bound: Option<&TargetId>) -> Self {
        let entries = build_entries(targets);
        let cursor = entries
            .iter()
            .position(|entry| entry.is(bound))
            .unwrap_or(0);
        Self { entries, cursor }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.entries.iter().filter_map(MenuEntry::target)
    }

    pub fn selected(&self) -> Option<&MenuEntry> {
        self.entries.get(self.cursor)
    }

    pub fn next(&mut self) {
        if self.is_empty() {
            return;
        }
        self.cursor = (self.cursor + 1) % self.len();
    }

    pub fn previous(&mut self) {
        if self.is_empty() {
            return;
        }
        self.cursor = (self.cursor + self.len() - 1) % self.len();
    }

    /// Moves the cursor one entry. Returns `false` when there is nothing to move over.
    pub fn step(&mut self, event: EncoderEvent) -> bool {
        if self.is_empty() {
            return false;
        }
        match event {
            EncoderEvent::Clockwise => self.next(),
            EncoderEvent::CounterClockwise => self.previous(),
        }
        true
    }

    /// Replaces the entries, keeping the cursor position where it is still valid.
    pub fn refresh(&mut self, targets: Vec<Target>) {
        self.entries = build_entries(targets);
        if self.cursor >= self.entries.len() {
            self.cursor = self.entries.len().saturating_sub(1);
        }
    }

    pub fn view(&self, bound: Option<&TargetId>) -> MenuView {
        MenuView {
            entries: self
                .entries
                .iter()
                .map(|entry| entry.label().to_string())
                .collect(),
            cursor: self.cursor,
            bound: self.entries.iter().position(|entry| entry.is(bound)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(count: usize) -> Vec<Target> {
        (0..count)
            .map(|index| Target::device(format!("sink_{index}"), format!("Sink {index}")))
            .collect()
    }

    fn selected_handle(menu: &MenuModel) -> Option<&str> {
        menu.selected()
            .and_then(MenuEntry::target)
            .map(|target| target.id.handle.as_str())
    }

    #[test]
    fn unbind_row_leads_a_non_empty_list() {
        let menu = MenuModel::new(targets(2), None);
        assert_eq!(menu.view(None).entries, vec![UNBIND_LABEL, "Sink 0", "Sink 1"]);
        assert_eq!(menu.targets().count(), 2);

        assert!(MenuModel::new(Vec::new(), None).is_empty());
    }

    #[test]
    fn starts_on_bound_target_or_unbind_row() {
        let list = targets(3);
        let bound = list[2].id.clone();

        assert_eq!(MenuModel::new(list.clone(), Some(&bound)).cursor(), 3);

        let unbound = MenuModel::new(list.clone(), None);
        assert_eq!(unbound.cursor(), 0);
        assert!(matches!(unbound.selected(), Some(MenuEntry::Unbind)));

        let stale = Target::application("99", "Closed app").id;
        assert_eq!(MenuModel::new(list, Some(&stale)).cursor(), 0);
    }

    #[test]
    fn cursor_wraps_in_both_directions() {
        let mut menu = MenuModel::new(targets(2), None);

        menu.step(EncoderEvent::CounterClockwise);
        assert_eq!(menu.cursor(), 2);
        menu.step(EncoderEvent::CounterClockwise);
        assert_eq!(menu.cursor(), 1);

        menu.step(EncoderEvent::Clockwise);
        menu.step(EncoderEvent::Clockwise);
        assert_eq!(menu.cursor(), 0);
        menu.step(EncoderEvent::Clockwise);
        assert_eq!(selected_handle(&menu), Some("sink_0"));
    }

    #[test]
    fn empty_menu_ignores_rotation() {
        let mut menu = MenuModel::new(Vec::new(), None);
        assert!(!menu.step(EncoderEvent::Clockwise));
        assert!(!menu.step(EncoderEvent::CounterClockwise));
        assert_eq!(menu.cursor(), 0);
        assert!(menu.selected().is_none());
    }

    #[test]
    fn refresh_clamps_cursor_to_shorter_list() {
        let mut menu = MenuModel::new(targets(5), None);
        for _ in 0..5 {
            menu.next();
        }
        assert_eq!(menu.cursor(), 5);

        menu.refresh(targets(2));
        assert_eq!(menu.cursor(), 2);

        menu.refresh(targets(4));
        assert_eq!(menu.cursor(), 2);

        menu.refresh(Vec::new());
        assert_eq!(menu.cursor(), 0);
        assert!(menu.is_empty());
    }

    #[test]
    fn view_marks_cursor_and_binding() {
        let list = targets(3);
        let bound = list[1].id.clone();
        let mut menu = MenuModel::new(list, None);
        menu.next();
        menu.next();
        menu.next();

        let view = menu.view(Some(&bound));
        assert_eq!(view.entries, vec![UNBIND_LABEL, "Sink 0", "Sink 1", "Sink 2"]);
        assert_eq!(view.cursor, 3);
        assert_eq!(view.bound, Some(2));

        assert_eq!(menu.view(None).bound, Some(0));
    }
}
