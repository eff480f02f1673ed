//! Custom traits: styling of the `egui` context, modal notifications and
//! order-preserving deduplication.

use egui::{
    Align, Color32, Context,
    FontFamily::Proportional,
    FontId, Frame, Layout, Spacing, Stroke, Style,
    TextStyle::{Body, Button, Heading, Monospace, Small},
    Vec2, Visuals, Window,
    style::ScrollStyle,
};

use std::{collections::HashSet, hash::Hash};

/// Defines custom text styles for the egui context.
pub const CUSTOM_TEXT_STYLE: [(egui::TextStyle, egui::FontId); 5] = [
    (Heading, FontId::new(18.0, Proportional)),
    (Body, FontId::new(15.0, Proportional)),
    (Button, FontId::new(15.0, Proportional)),
    (Monospace, FontId::new(14.0, Proportional)),
    (Small, FontId::new(12.0, Proportional)),
];

/// A trait for applying custom styling to the `egui` context (`Context`).
/// Used once at startup by `DashboardApp::new`.
pub trait MyStyle {
    /// Applies a pre-defined application style to the `egui` context.
    fn set_style_init(&self, visuals: Visuals);
}

impl MyStyle for Context {
    fn set_style_init(&self, visuals: Visuals) {
        let scroll = ScrollStyle {
            handle_min_length: 32.0,
            ..ScrollStyle::default()
        };

        let spacing = Spacing {
            scroll,
            item_spacing: [8.0, 6.0].into(),
            ..Spacing::default()
        };

        let style = Style {
            visuals,
            spacing,
            text_styles: CUSTOM_TEXT_STYLE.into(),
            ..Style::default()
        };

        self.set_style(style);
    }
}

/// Modal notification windows, managed by `DashboardApp` as `Box<dyn Notification>`.
pub trait Notification: Send + Sync + 'static {
    /// Renders the notification window.
    ///
    /// ### Returns
    /// `true` if the window should remain open, `false` if closed.
    fn show(&mut self, ctx: &Context) -> bool;
}

/// Error window for failures not tied to a panel (export, folder selection).
pub struct Error {
    pub message: String,
}

impl Notification for Error {
    fn show(&mut self, ctx: &Context) -> bool {
        let mut open = true;

        Window::new("Error")
            .collapsible(false)
            .open(&mut open)
            .show(ctx, |ui| {
                let width_max = ui.available_width() * 0.80;
                ui.allocate_ui_with_layout(
                    Vec2::new(width_max, ui.available_height()),
                    Layout::top_down(Align::LEFT),
                    |ui| {
                        Frame::default()
                            .fill(Color32::from_rgb(255, 200, 200)) // Light red bg
                            .stroke(Stroke::new(1.0, Color32::DARK_RED))
                            .outer_margin(2.0)
                            .inner_margin(10.0)
                            .show(ui, |ui| {
                                ui.colored_label(Color32::BLACK, &self.message);
                            });
                    },
                );
            });

        open
    }
}

/// A trait for deduplicating vectors while preserving the original order of elements.
/// Used for filter options, whose order is the engine's.
pub trait UniqueElements<T> {
    /// Removes duplicate elements in place, keeping the first occurrence.
    fn unique(&mut self)
    where
        T: Eq + Hash + Clone;
}

impl<T> UniqueElements<T> for Vec<T> {
    fn unique(&mut self)
    where
        T: Eq + Hash + Clone,
    {
        let mut seen = HashSet::new();
        self.retain(|x| seen.insert(x.clone())); // Keep if insert succeeds (element is new).
    }
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//

/// Run tests with:
/// `cargo test -- --show-output tests_unique`
#[cfg(test)]
mod tests_unique {
    use super::*;

    #[test]
    fn test_unique_keeps_first_occurrence() {
        let mut values = vec!["BBB", "AAA", "BBB", "CCC", "AAA"];
        values.unique();
        assert_eq!(values, vec!["BBB", "AAA", "CCC"]);
    }

    #[test]
    fn test_unique_empty_and_single() {
        let mut empty: Vec<String> = Vec::new();
        empty.unique();
        assert!(empty.is_empty());

        let mut single = vec![1];
        single.unique();
        assert_eq!(single, vec![1]);
    }
}
