//! Painter-drawn charts for pivoted results: grouped bars and annotated heatmaps.
//!
//! Everything is drawn with `egui::Painter` in a rect allocated from the `Ui`.
//! Absent matrix cells are never drawn, so "no data" stays visibly different from zero.

use crate::ResultMatrix;

use egui::{
    Align2, Color32, CornerRadius, FontId, Painter, Pos2, Rect, Sense, Stroke, Ui, pos2, vec2,
};

/// Height of the plotting area of every chart.
pub const CHART_HEIGHT: f32 = 280.0;

const MARGIN_LEFT: f32 = 80.0;
const MARGIN_RIGHT: f32 = 16.0;
const MARGIN_TOP: f32 = 36.0;
const MARGIN_BOTTOM: f32 = 42.0;
const LABEL_FONT: f32 = 12.0;
/// Share of a group slot covered by its bars; the rest separates the groups.
const GROUP_FILL: f32 = 0.8;

/// Matplotlib's "tab10" qualitative palette, one colour per series.
const TAB10: [Color32; 10] = [
    Color32::from_rgb(31, 119, 180),
    Color32::from_rgb(255, 127, 14),
    Color32::from_rgb(44, 160, 44),
    Color32::from_rgb(214, 39, 40),
    Color32::from_rgb(148, 103, 189),
    Color32::from_rgb(140, 86, 75),
    Color32::from_rgb(227, 119, 194),
    Color32::from_rgb(127, 127, 127),
    Color32::from_rgb(188, 189, 34),
    Color32::from_rgb(23, 190, 207),
];

/// Stops of a yellow-green-blue sequential scale (low values light, high values dark).
const YL_GN_BU: [Color32; 5] = [
    Color32::from_rgb(255, 255, 217),
    Color32::from_rgb(199, 233, 180),
    Color32::from_rgb(65, 182, 196),
    Color32::from_rgb(34, 94, 168),
    Color32::from_rgb(8, 29, 88),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Vertical,
    Horizontal,
}

/// Series colour for column label `index`. Wraps after ten series.
pub fn series_color(index: usize) -> Color32 {
    TAB10[index % TAB10.len()]
}

/// Colour of normalized value `t` (clamped to `0..=1`) on the heatmap scale.
pub fn heat_color(t: f64) -> Color32 {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (YL_GN_BU.len() - 1) as f64;
    let index = (scaled.floor() as usize).min(YL_GN_BU.len() - 2);
    let local = (scaled - index as f64) as f32;
    lerp_color(YL_GN_BU[index], YL_GN_BU[index + 1], local)
}

fn lerp_color(a: Color32, b: Color32, t: f32) -> Color32 {
    let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round() as u8;
    Color32::from_rgb(mix(a.r(), b.r()), mix(a.g(), b.g()), mix(a.b(), b.b()))
}

/// Readable text colour on top of `background`.
fn contrast_text(background: Color32) -> Color32 {
    let luma = 0.299 * background.r() as f32
        + 0.587 * background.g() as f32
        + 0.114 * background.b() as f32;
    if luma > 140.0 {
        Color32::BLACK
    } else {
        Color32::WHITE
    }
}

/// Bar label: integers without decimals, anything else with two.
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

/// Value axis for bars: always includes zero, padded 10% beyond the data for labels.
pub fn value_axis(range: Option<(f64, f64)>) -> (f64, f64) {
    let (lo, hi) = range.unwrap_or((0.0, 1.0));
    let (lo, hi) = (lo.min(0.0), hi.max(0.0));
    let span = hi - lo;
    if span <= 0.0 {
        return (0.0, 1.0);
    }
    let lo = if lo < 0.0 { lo - span * 0.1 } else { lo };
    let hi = if hi > 0.0 { hi + span * 0.1 } else { hi };
    (lo, hi)
}

/// Draws a grouped bar chart: one group per row label, one bar per column label.
///
/// Vertical charts print the value on top of each bar.
pub fn bar_chart(ui: &mut Ui, matrix: &ResultMatrix, orientation: Orientation) {
    legend(ui, &axis_name(&matrix.col_dim), &matrix.col_labels);

    let size = vec2(ui.available_width(), CHART_HEIGHT);
    let (response, painter) = ui.allocate_painter(size, Sense::hover());
    let plot = Rect::from_min_max(
        response.rect.min + vec2(MARGIN_LEFT, MARGIN_TOP),
        response.rect.max - vec2(MARGIN_RIGHT, MARGIN_BOTTOM),
    );

    let text_color = ui.visuals().text_color();
    let axis_stroke = Stroke::new(1.0, ui.visuals().weak_text_color());
    let (lo, hi) = value_axis(matrix.value_range());

    let groups = matrix.row_labels.len().max(1);
    let series = matrix.col_labels.len().max(1);
    let font = FontId::proportional(LABEL_FONT);

    match orientation {
        Orientation::Vertical => {
            let to_y = |v: f64| plot.bottom() - ((v - lo) / (hi - lo)) as f32 * plot.height();
            let slot = plot.width() / groups as f32;
            let bar_width = slot * GROUP_FILL / series as f32;

            let zero = to_y(0.0);
            painter.line_segment([pos2(plot.left(), zero), pos2(plot.right(), zero)], axis_stroke);
            painter.line_segment([plot.left_top(), plot.left_bottom()], axis_stroke);
            axis_ticks(&painter, plot, lo, hi, Orientation::Vertical, text_color);

            for (r, label) in matrix.row_labels.iter().enumerate() {
                let group_left = plot.left() + slot * r as f32 + slot * (1.0 - GROUP_FILL) / 2.0;
                painter.text(
                    pos2(plot.left() + slot * (r as f32 + 0.5), plot.bottom() + 4.0),
                    Align2::CENTER_TOP,
                    label,
                    font.clone(),
                    text_color,
                );

                for (c, value) in present_cells(matrix, r) {
                    let x = group_left + bar_width * c as f32;
                    let (top, bottom) = (to_y(value.max(0.0)), to_y(value.min(0.0)));
                    let bar = Rect::from_min_max(pos2(x, top), pos2(x + bar_width, bottom));
                    painter.rect_filled(bar, CornerRadius::ZERO, series_color(c));
                    painter.text(
                        pos2(bar.center().x, top - 2.0),
                        Align2::CENTER_BOTTOM,
                        format_value(value),
                        font.clone(),
                        text_color,
                    );
                }
            }
        }
        Orientation::Horizontal => {
            let to_x = |v: f64| plot.left() + ((v - lo) / (hi - lo)) as f32 * plot.width();
            let slot = plot.height() / groups as f32;
            let bar_height = slot * GROUP_FILL / series as f32;

            let zero = to_x(0.0);
            painter.line_segment([pos2(zero, plot.top()), pos2(zero, plot.bottom())], axis_stroke);
            painter.line_segment([plot.left_bottom(), plot.right_bottom()], axis_stroke);
            axis_ticks(&painter, plot, lo, hi, Orientation::Horizontal, text_color);

            for (r, label) in matrix.row_labels.iter().enumerate() {
                let group_top = plot.top() + slot * r as f32 + slot * (1.0 - GROUP_FILL) / 2.0;
                painter.text(
                    pos2(plot.left() - 6.0, plot.top() + slot * (r as f32 + 0.5)),
                    Align2::RIGHT_CENTER,
                    label,
                    font.clone(),
                    text_color,
                );

                for (c, value) in present_cells(matrix, r) {
                    let y = group_top + bar_height * c as f32;
                    let (left, right) = (to_x(value.min(0.0)), to_x(value.max(0.0)));
                    let bar = Rect::from_min_max(pos2(left, y), pos2(right, y + bar_height));
                    painter.rect_filled(bar, CornerRadius::ZERO, series_color(c));
                }
            }
        }
    }

    axis_title(&painter, response.rect, plot, matrix, orientation, text_color);
}

/// `(column index, value)` of the present cells in row `r`.
fn present_cells(matrix: &ResultMatrix, r: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
    (0..matrix.col_labels.len()).filter_map(move |c| matrix.cell(r, c).map(|v| (c, v)))
}

/// Five evenly spaced value ticks along the value axis.
fn axis_ticks(
    painter: &Painter,
    plot: Rect,
    lo: f64,
    hi: f64,
    orientation: Orientation,
    color: Color32,
) {
    let font = FontId::proportional(LABEL_FONT - 1.0);
    for step in 0..=4 {
        let value = lo + (hi - lo) * step as f64 / 4.0;
        let t = step as f32 / 4.0;
        let (pos, align) = match orientation {
            Orientation::Vertical => (
                pos2(plot.left() - 4.0, plot.bottom() - t * plot.height()),
                Align2::RIGHT_CENTER,
            ),
            Orientation::Horizontal => (
                pos2(plot.left() + t * plot.width(), plot.bottom() + 4.0),
                Align2::CENTER_TOP,
            ),
        };
        painter.text(pos, align, format_tick(value), font.clone(), color);
    }
}

fn format_tick(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1e6 {
        format!("{:.1}M", value / 1e6)
    } else if magnitude >= 1e3 {
        format!("{:.1}k", value / 1e3)
    } else {
        format!("{value:.0}")
    }
}

/// `TRADE_CATEGORY` -> `Trade Category`.
pub fn axis_name(column: &str) -> String {
    column
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Names both axes: the row dimension along the categories, the measure along the values.
fn axis_title(
    painter: &Painter,
    outer: Rect,
    plot: Rect,
    matrix: &ResultMatrix,
    orientation: Orientation,
    color: Color32,
) {
    let font = FontId::proportional(LABEL_FONT);
    let category = axis_name(&matrix.row_dim);
    let value = axis_name(&matrix.value_col);
    let bottom = pos2(plot.center().x, outer.bottom());
    let top_left = pos2(outer.left() + 2.0, outer.top());

    let (at_bottom, at_top) = match orientation {
        Orientation::Vertical => (category, value),
        Orientation::Horizontal => (value, category),
    };
    painter.text(bottom, Align2::CENTER_BOTTOM, at_bottom, font.clone(), color);
    painter.text(top_left, Align2::LEFT_TOP, at_top, font, color);
}

/// One coloured swatch per series, keyed by the column dimension.
fn legend(ui: &mut Ui, title: &str, labels: &[String]) {
    ui.horizontal_wrapped(|ui| {
        ui.strong(format!("{title}:"));
        for (index, label) in labels.iter().enumerate() {
            let (rect, _) = ui.allocate_exact_size(vec2(12.0, 12.0), Sense::hover());
            ui.painter().rect_filled(rect, CornerRadius::same(2), series_color(index));
            ui.label(label);
            ui.add_space(8.0);
        }
    });
}

/// Draws the matrix as a heatmap, every present cell annotated with one decimal.
///
/// Absent cells stay blank. A colour bar below the grid shows the value range.
pub fn heatmap(ui: &mut Ui, matrix: &ResultMatrix) {
    let Some((lo, hi)) = matrix.value_range() else {
        ui.label("No values to plot.");
        return;
    };

    let rows = matrix.row_labels.len().max(1);
    let cols = matrix.col_labels.len().max(1);
    let colour_bar_height = 36.0;

    let size = vec2(ui.available_width(), CHART_HEIGHT + colour_bar_height);
    let (response, painter) = ui.allocate_painter(size, Sense::hover());
    let grid = Rect::from_min_max(
        response.rect.min + vec2(MARGIN_LEFT, MARGIN_TOP),
        pos2(response.rect.right() - MARGIN_RIGHT, response.rect.top() + CHART_HEIGHT),
    );

    let text_color = ui.visuals().text_color();
    let font = FontId::proportional(LABEL_FONT);
    let cell = vec2(grid.width() / cols as f32, grid.height() / rows as f32);
    let normalize = |v: f64| if hi > lo { (v - lo) / (hi - lo) } else { 0.5 };

    for (c, label) in matrix.col_labels.iter().enumerate() {
        painter.text(
            pos2(grid.left() + cell.x * (c as f32 + 0.5), grid.top() - 4.0),
            Align2::CENTER_BOTTOM,
            label,
            font.clone(),
            text_color,
        );
    }
    painter.text(
        pos2(grid.center().x, grid.top() - 20.0),
        Align2::CENTER_BOTTOM,
        axis_name(&matrix.col_dim),
        font.clone(),
        text_color,
    );
    painter.text(
        pos2(response.rect.left() + 2.0, grid.top() - 4.0),
        Align2::LEFT_BOTTOM,
        axis_name(&matrix.row_dim),
        font.clone(),
        text_color,
    );
    for (r, label) in matrix.row_labels.iter().enumerate() {
        painter.text(
            pos2(grid.left() - 6.0, grid.top() + cell.y * (r as f32 + 0.5)),
            Align2::RIGHT_CENTER,
            label,
            font.clone(),
            text_color,
        );
    }

    for (r, c, value) in matrix.iter() {
        let min = grid.min + vec2(cell.x * c as f32, cell.y * r as f32);
        let rect = Rect::from_min_size(min, cell).shrink(1.0);
        let fill = heat_color(normalize(value));
        painter.rect_filled(rect, CornerRadius::ZERO, fill);
        painter.text(
            rect.center(),
            Align2::CENTER_CENTER,
            format!("{value:.1}"),
            font.clone(),
            contrast_text(fill),
        );
    }

    colour_bar(&painter, grid, lo, hi, &axis_name(&matrix.value_col), text_color);
}

fn colour_bar(painter: &Painter, grid: Rect, lo: f64, hi: f64, title: &str, color: Color32) {
    const STEPS: usize = 48;
    let top = grid.bottom() + 8.0;
    let step_width = grid.width() / STEPS as f32;
    for step in 0..STEPS {
        let min = Pos2::new(grid.left() + step_width * step as f32, top);
        let rect = Rect::from_min_size(min, vec2(step_width + 0.5, 10.0));
        let fill = heat_color(step as f64 / (STEPS - 1) as f64);
        painter.rect_filled(rect, CornerRadius::ZERO, fill);
    }

    let font = FontId::proportional(LABEL_FONT - 1.0);
    let y = top + 12.0;
    painter.text(pos2(grid.left(), y), Align2::LEFT_TOP, format!("{lo:.1}"), font.clone(), color);
    painter.text(pos2(grid.center().x, y), Align2::CENTER_TOP, title, font.clone(), color);
    painter.text(pos2(grid.right(), y), Align2::RIGHT_TOP, format!("{hi:.1}"), font, color);
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//

/// Run tests with:
/// `cargo test -- --show-output tests_charts`
#[cfg(test)]
mod tests_charts {
    use super::*;

    #[test]
    fn heat_scale_endpoints() {
        assert_eq!(heat_color(0.0), YL_GN_BU[0]);
        assert_eq!(heat_color(1.0), YL_GN_BU[4]);
        assert_eq!(heat_color(0.5), YL_GN_BU[2]);
        assert_eq!(heat_color(-3.0), YL_GN_BU[0]);
        assert_eq!(heat_color(f64::NAN), YL_GN_BU[0]);
    }

    #[test]
    fn text_contrasts_with_cell() {
        assert_eq!(contrast_text(heat_color(0.0)), Color32::BLACK);
        assert_eq!(contrast_text(heat_color(1.0)), Color32::WHITE);
    }

    #[test]
    fn palette_wraps() {
        assert_eq!(series_color(0), series_color(10));
        assert_ne!(series_color(0), series_color(1));
    }

    #[test]
    fn value_axis_includes_zero() {
        assert_eq!(value_axis(Some((5.0, 10.0))), (0.0, 11.0));
        assert_eq!(value_axis(Some((-10.0, 0.0))), (-11.0, 0.0));
        assert_eq!(value_axis(Some((0.0, 0.0))), (0.0, 1.0));
        let (lo, hi) = value_axis(None);
        assert_eq!(lo, 0.0);
        assert!((hi - 1.1).abs() < 1e-9);
    }

    #[test]
    fn axis_names_from_columns() {
        assert_eq!(axis_name("TRADE_CATEGORY"), "Trade Category");
        assert_eq!(axis_name("GENDER"), "Gender");
        assert_eq!(axis_name("VALUE_TRADE_COUNT"), "Value Trade Count");
        assert_eq!(axis_name("avg__price"), "Avg Price");
        assert_eq!(axis_name(""), "");
    }

    #[test]
    fn bar_labels() {
        assert_eq!(format_value(12.0), "12");
        assert_eq!(format_value(12.346), "12.35");
        assert_eq!(format_tick(2500.0), "2.5k");
        assert_eq!(format_tick(3_000_000.0), "3.0M");
    }
}
