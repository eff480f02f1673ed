use crate::{ResultTable, Scalar};

use egui::{Align, Direction, Layout, RichText, Sense, TextStyle, Ui};
use egui_extras::{Column, TableBuilder, TableRow};
use std::cmp::Ordering;

/// Maximum height of a table before it scrolls.
const MAX_TABLE_HEIGHT: f32 = 320.0;

/// View-only sort of a rendered table; the query result itself is never reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSort {
    pub column: usize,
    pub ascending: bool,
}

impl ColumnSort {
    /// Next state after a click on `column`: ascending, then descending, then unsorted.
    pub fn cycle(current: Option<ColumnSort>, column: usize) -> Option<ColumnSort> {
        match current {
            Some(sort) if sort.column == column && sort.ascending => Some(ColumnSort {
                column,
                ascending: false,
            }),
            Some(sort) if sort.column == column => None,
            _ => Some(ColumnSort {
                column,
                ascending: true,
            }),
        }
    }

    fn icon(current: Option<ColumnSort>, column: usize) -> &'static str {
        match current {
            Some(sort) if sort.column == column && sort.ascending => "⏶",
            Some(sort) if sort.column == column => "⏷",
            _ => "↕",
        }
    }
}

/// Numbers compare numerically, everything else by its label. Nulls sort first.
fn compare_cells(a: &Scalar, b: &Scalar) -> Ordering {
    match (a, b) {
        (Scalar::Null, Scalar::Null) => Ordering::Equal,
        (Scalar::Null, _) => Ordering::Less,
        (_, Scalar::Null) => Ordering::Greater,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

/// Row order to display for `sort`. Stable, so ties keep the engine's order.
pub fn sorted_indices(table: &ResultTable, sort: Option<ColumnSort>) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..table.height()).collect();
    if let Some(ColumnSort { column, ascending }) = sort.filter(|s| s.column < table.width()) {
        indices.sort_by(|&i, &j| {
            let ordering = compare_cells(&table.rows[i][column], &table.rows[j][column]);
            if ascending { ordering } else { ordering.reverse() }
        });
    }
    indices
}

/// Cell text and alignment: numbers right-aligned, floats with two decimals, nulls blank.
fn format_cell(value: &Scalar) -> (String, Layout) {
    match value {
        Scalar::Float(f) => (format!("{f:.2}"), Layout::right_to_left(Align::Center)),
        Scalar::Int(i) => (i.to_string(), Layout::right_to_left(Align::Center)),
        Scalar::Bool(b) => (
            b.to_string(),
            Layout::centered_and_justified(Direction::LeftToRight),
        ),
        Scalar::Null => (String::new(), Layout::left_to_right(Align::Center)),
        Scalar::Text(s) => (s.clone(), Layout::left_to_right(Align::Center)),
    }
}

/// Renders a `ResultTable` with clickable sort headers.
///
/// `id` keeps the state of several tables on the same screen apart.
/// `sort` is updated in place when a header is clicked.
pub fn render_table(ui: &mut Ui, id: &str, table: &ResultTable, sort: &mut Option<ColumnSort>) {
    if table.width() == 0 {
        ui.label("No columns.");
        return;
    }

    let order = sorted_indices(table, *sort);
    let mut clicked = None;

    let analyze_header = |mut table_row: TableRow<'_, '_>| {
        for (index, column_name) in table.columns.iter().enumerate() {
            table_row.col(|ui| {
                ui.horizontal_centered(|ui| {
                    let icon = ColumnSort::icon(*sort, index);
                    let response = ui
                        .add(egui::Label::new(icon).sense(Sense::click()))
                        .on_hover_text(format!("Click to sort by: {column_name}"));
                    if response.clicked() {
                        clicked = Some(index);
                    }
                    ui.label(RichText::new(column_name).strong());
                });
            });
        }
    };

    let analyze_rows = |mut table_row: TableRow<'_, '_>| {
        let row = &table.rows[order[table_row.index()]];
        for value in row {
            let (text, layout) = format_cell(value);
            table_row.col(|ui| {
                ui.with_layout(layout.with_main_wrap(false), |ui| {
                    ui.label(text);
                });
            });
        }
    };

    let style = ui.style();
    let text_height = TextStyle::Body.resolve(style).size;
    let col_number = table.width() as f32;
    let available_space = ui.available_width()
        - col_number * style.spacing.item_spacing.x
        - style.spacing.scroll.bar_width;

    let initial_col_width = available_space / col_number;
    let header_height = style.spacing.interact_size.y + 2.0 * style.spacing.item_spacing.y;
    let min_col_width = style.spacing.interact_size.x.max(initial_col_width / 4.0);

    let column = Column::initial(initial_col_width)
        .at_least(min_col_width)
        .resizable(true)
        .clip(true);

    ui.push_id(id, |ui| {
        TableBuilder::new(ui)
            .striped(true)
            .columns(column, table.width())
            .auto_shrink([false, true])
            .max_scroll_height(MAX_TABLE_HEIGHT)
            .header(header_height, analyze_header)
            .body(|body| {
                body.rows(text_height, table.height(), analyze_rows);
            });
    });

    if let Some(index) = clicked {
        *sort = ColumnSort::cycle(*sort, index);
    }
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//
